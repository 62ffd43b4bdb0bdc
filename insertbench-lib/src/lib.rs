#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod data;
pub mod dispatch;
pub mod limiter;
pub mod submit;
pub mod utils;
