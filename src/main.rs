use game_audio_stream::cli::CliApp;
use game_audio_stream::logging::DecodeLogger;
use log::log;

fn main() {
    if let Err(e) = DecodeLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let app = CliApp::parse();
    if let Err(e) = app.run() {
        let severity = e.severity();
        log!(severity.log_level(), "{}", e);
        eprintln!("{}: {}", severity.as_str(), e.user_message());
        for suggestion in e.recovery_suggestions() {
            eprintln!("  - {}", suggestion);
        }
        std::process::exit(1);
    }
}
