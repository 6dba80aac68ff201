/// Runs CPU-bound work off the async executor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CpuBackend;

impl CpuBackend {
    /// Executes `f` on the rayon pool, or inline when single-threaded.
    pub(crate) async fn blocking<F, R>(f: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        cfg_if::cfg_if! {
            if #[cfg(all(feature = "rayon", not(feature = "force-st")))] {
                let (sender, receiver) = futures::channel::oneshot::channel();
                rayon::spawn(move || {
                    _ = sender.send(f());
                });

                receiver.await.expect("worker thread does not drop the channel")
            } else {
                f()
            }
        }
    }
}
