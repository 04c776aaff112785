use crate::domain::ports::{StatusKind, StatusPresenter};
use log::{error, info};

/// Presents status lines on the console for the operator at the till.
#[derive(Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl StatusPresenter for ConsolePresenter {
    fn update_status(&self, text: &str, kind: StatusKind) {
        match kind {
            StatusKind::Information => {
                info!("status: {text}");
                println!("{text}");
            }
            StatusKind::Error => {
                error!("status: {text}");
                eprintln!("{text}");
            }
        }
    }
}
