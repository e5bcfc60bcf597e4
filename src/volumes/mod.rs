// Copyright @yucwang 2026

pub mod density_volume;
pub mod illumination_volume;
pub mod sampler;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VolumeFilterMode {
    Nearest,
    Trilinear,
}

impl VolumeFilterMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nearest" => Some(VolumeFilterMode::Nearest),
            "trilinear" | "linear" => Some(VolumeFilterMode::Trilinear),
            _ => None,
        }
    }
}
