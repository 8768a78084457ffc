pub mod mix;
pub mod quantize;
pub mod resample;
