pub mod env;
pub mod err;
pub mod monitoring;

#[macro_export]
macro_rules! log_err {
    ($res:expr) => {
        if let Err(err) = &$res {
            tracing::error!("{:?}", err);
        }
    };
}
