pub mod compare;
pub mod export;
pub mod generate;
pub mod pairs;
pub mod score;
pub mod status;
