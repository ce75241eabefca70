pub mod portfolio;
pub mod stocks;
pub mod trading;
