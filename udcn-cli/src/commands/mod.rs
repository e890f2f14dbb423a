pub mod benchmark;
pub mod interest;
pub mod management;
pub mod publish;
