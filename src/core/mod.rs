// Copyright @yucwang 2021

pub mod device;
pub mod emitter;
pub mod error;
pub mod kernel;
pub mod march;
pub mod params;
pub mod rng;
pub mod scene;
pub mod sensor;
pub mod settings_loader;
pub mod transfer_function;
pub mod volume;
