pub mod chart;
pub mod intent;
pub mod response;
