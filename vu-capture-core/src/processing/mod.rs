pub mod ballistics;
pub mod meter;
pub mod reference;
pub mod vu_dsp;
