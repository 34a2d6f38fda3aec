use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::thread;

use flume::SendError;

use crate::error::Result;

/// Maps `items` through `f` on `workers` threads and hands the results to `sink`
/// in input order.
///
/// `sink` can stop the pipeline early by returning `ControlFlow::Break`; the
/// remaining in-flight items are dropped. The first error from `items` or
/// `sink` is returned.
pub fn ordered_map<T, U, I, F, S>(items: I, workers: usize, f: F, mut sink: S) -> Result<()>
where
    I: Iterator<Item = Result<T>> + Send,
    T: Send,
    U: Send,
    F: Fn(T) -> U + Sync,
    S: FnMut(U) -> Result<ControlFlow<()>>,
{
    let workers = workers.max(1);
    let (job_sender, job_receiver) = flume::bounded::<(usize, T)>(2 * workers);
    let (result_sender, result_receiver) = flume::bounded::<(usize, U)>(2 * workers);

    thread::scope(|scope| {
        let feeder = scope.spawn(move || -> Result<()> {
            for (index, item) in items.enumerate() {
                match job_sender.send((index, item?)) {
                    Ok(()) => {}
                    // all workers are gone, the sink stopped early
                    Err(SendError(_)) => break,
                }
            }
            Ok(())
        });

        for _ in 0..workers {
            let job_receiver = job_receiver.clone();
            let result_sender = result_sender.clone();
            let f = &f;
            scope.spawn(move || {
                for (index, item) in job_receiver.iter() {
                    if result_sender.send((index, f(item))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_receiver);
        drop(result_sender);

        let sink_result = drain_in_order(&result_receiver, &mut sink);
        // disconnect so that workers and feeder wind down
        drop(result_receiver);

        let feeder_result = match feeder.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        sink_result.and(feeder_result)
    })
}

fn drain_in_order<U, S>(receiver: &flume::Receiver<(usize, U)>, sink: &mut S) -> Result<()>
where
    S: FnMut(U) -> Result<ControlFlow<()>>,
{
    let mut pending = BTreeMap::new();
    let mut next = 0;

    for (index, value) in receiver.iter() {
        pending.insert(index, value);

        while let Some(value) = pending.remove(&next) {
            next += 1;
            if sink(value)?.is_break() {
                return Ok(());
            }
        }
    }

    Ok(())
}
