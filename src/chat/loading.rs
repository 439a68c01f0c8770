use std::io::{self, Write};
use std::time::Duration;

use colored::Colorize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Prints a dot per second on stdout until stopped.
pub struct LoadingIndicator {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LoadingIndicator {
    const TICK: Duration = Duration::from_secs(1);

    pub fn start(message: &str) -> Self {
        println!("\n{}", message.white());
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Self::TICK);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        print!(".");
                        let _ = io::stdout().flush();
                    }
                }
            }
            println!();
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Indicator that never prints, for non-interactive runs.
    pub fn disabled() -> Self {
        Self {
            stop: None,
            handle: None,
        }
    }

    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
