/// Logs an error with the given context message if `$result` is an `Err`.
///
/// Useful for results we cannot act on, e.g. cleanup paths.
macro_rules! log_if_err {
    ($result:expr, $($arg:tt)*) => {
        if let Err(ref e) = $result {
            log::error!("{}: {}", format_args!($($arg)*), e);
        }
    };
}
