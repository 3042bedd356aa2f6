pub mod helpers;
mod tests_batch;
mod tests_concurrent;
mod tests_put_get;
mod tests_recovery;
mod tests_snapshot;
