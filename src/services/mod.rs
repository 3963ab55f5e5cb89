pub mod token;
pub mod storage;
