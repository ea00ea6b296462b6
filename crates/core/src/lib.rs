pub mod detection {
    pub mod domain {
        pub mod cascade_config;
        pub mod cascade_detector;
        pub mod detection;
        pub mod face_detector;
        pub mod face_landmarks;
        pub mod output_stage;
        pub mod proposal_stage;
        pub mod refinement_stage;
        pub mod stage_evaluator;
        #[cfg(test)]
        pub mod stub_evaluators;
        pub mod suppression;
        pub mod window_stage;
    }
    pub mod infrastructure;
}

pub mod io {
    pub mod domain {
        pub mod detection_report;
        pub mod image_reader;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod detect_image_use_case;
    pub mod pipeline_logger;
}

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod image_tensor;
    pub mod model_resolver;
    pub mod region;
    pub mod worker_pool;
}
