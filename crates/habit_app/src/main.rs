use habit_app::{config::AppConfig, host::run};

fn main() {
    // stdout carries the response stream.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let config = AppConfig::from_env().unwrap_or_default();
    if let Err(err) = run(config) {
        eprintln!("Failed to run habit stack host: {err:#}");
        std::process::exit(1);
    }
}
