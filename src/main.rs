mod cli;
mod core;
mod logging;
mod platform;

use crate::core::error::MigrationError;
use crate::core::terminal;

#[tokio::main]
async fn main() {
    match cli::run_main().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            terminal::print_error(&format!("{:#}", e));
            if e
                .downcast_ref::<MigrationError>()
                .is_some_and(MigrationError::is_fatal)
            {
                terminal::print_info("Nothing was staged or sent.");
            }
            std::process::exit(1);
        }
    }
}
