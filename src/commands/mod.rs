pub mod aggregate;
pub mod refresh;
pub mod run;
pub mod status;
