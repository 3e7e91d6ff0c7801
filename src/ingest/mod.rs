pub mod hasher;
pub mod scanner;
pub mod sweep;
