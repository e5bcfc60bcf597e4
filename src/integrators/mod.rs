// Copyright @yucwang 2026

pub mod illumination;
pub mod raymarching;
