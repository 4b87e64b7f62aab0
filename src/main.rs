use tracewatch::cli::{internal_error, is_internal, run, user_error};

fn main() {
    #[cfg(windows)]
    let _ = enable_ansi_support::enable_ansi_support();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    if let Err(e) = run() {
        if is_internal(&e) {
            internal_error(&e);
        }
        user_error(&e.to_string());
    }
}
