pub mod beneficiary;
pub mod common;
pub mod donation;
pub mod matching;
