/// Maps `f` over `items` on at most `workers` threads.
///
/// Workers pull indices from a shared queue and keep per-worker partial
/// results; after the join barrier the partials are merged back into input
/// order, so the output does not depend on scheduling. `workers <= 1` runs
/// inline on the calling thread.
pub fn parallel_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.min(items.len());
    if workers <= 1 {
        return items.iter().map(f).collect();
    }

    let (job_tx, job_rx) = crossbeam_channel::bounded::<usize>(items.len());
    for index in 0..items.len() {
        // Capacity equals the job count, so this never blocks.
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    let f = &f;
    let partials: Vec<Vec<(usize, R)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let job_rx = job_rx.clone();
                scope.spawn(move || {
                    job_rx
                        .iter()
                        .map(|index| (index, f(&items[index])))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(partial) => partial,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut merged: Vec<(usize, R)> = partials.into_iter().flatten().collect();
    merged.sort_by_key(|(index, _)| *index);
    merged.into_iter().map(|(_, result)| result).collect()
}
