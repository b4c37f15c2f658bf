//! End-to-end scenarios for the extension tester.


#[cfg(test)]
mod basic_msg;

#[cfg(test)]
mod greeting;

#[cfg(test)]
mod local_dispatch;

#[cfg(test)]
mod concurrency;

#[cfg(test)]
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
