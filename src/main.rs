// Copyright 2020 TwoCookingMice

use volmarch::core::error::Result;
use volmarch::core::scene::VolumeScene;
use volmarch::core::settings_loader::{load_settings, RenderSettings};
use volmarch::core::volume::Volume;
use volmarch::devices::host::HostDevice;
use volmarch::io;

use console::style;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const USAGE: &str = "<settings.xml> <output.exr|png> [--step-size X] [--no-illumination] [--threads N] [--width N] [--height N]";

struct Overrides {
    step_size: Option<f32>,
    no_illumination: bool,
    threads: Option<usize>,
    width: Option<usize>,
    height: Option<usize>,
}

fn parse_overrides(args: &[String]) -> std::result::Result<Overrides, String> {
    let mut overrides = Overrides { step_size: None, no_illumination: false, threads: None, width: None, height: None };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--no-illumination" => overrides.no_illumination = true,
            flag @ ("--step-size" | "--threads" | "--width" | "--height") => {
                i += 1;
                let value = args.get(i).ok_or_else(|| format!("{} needs a value", flag))?;
                let bad = || format!("invalid value for {}: {}", flag, value);
                match flag {
                    "--step-size" => overrides.step_size = Some(value.parse().map_err(|_| bad())?),
                    "--threads" => overrides.threads = Some(value.parse().map_err(|_| bad())?),
                    "--width" => overrides.width = Some(value.parse().map_err(|_| bad())?),
                    _ => overrides.height = Some(value.parse().map_err(|_| bad())?),
                }
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }
    Ok(overrides)
}

fn apply_overrides(settings: &mut RenderSettings, overrides: &Overrides) {
    if let Some(step_size) = overrides.step_size {
        settings.raymarch.step_size = step_size;
    }
    if overrides.no_illumination {
        settings.raymarch.illumination_enabled = false;
    }
    if let Some(width) = overrides.width {
        settings.width = width;
    }
    if let Some(height) = overrides.height {
        settings.height = height;
    }
}

fn run(settings_path: &Path, output_path: &Path, overrides: &Overrides) -> Result<()> {
    let mut settings = load_settings(settings_path)?;
    apply_overrides(&mut settings, overrides);

    let mut device = HostDevice::new().with_progress(true);
    if let Some(threads) = overrides.threads {
        device = device.with_threads(threads);
    }
    log::info!("Using {} worker threads.", device.threads());

    let scene = VolumeScene::new(Arc::new(device), settings.illumination);
    let start = Instant::now();
    let volume = settings.volume.load_into(&scene)?;
    log::info!("Volume ready in {:.2?}.\n{}", start.elapsed(), volume.header().describe());

    scene.set_transfer_function(settings.transfer_function.clone());
    scene.set_lights(settings.lights.clone())?;

    let sensor = settings.build_sensor(&volume.bbox());
    log::info!("{}", sensor.describe());
    let frame = scene.render_frame(sensor.as_ref(), &settings.raymarch)?;

    let frame = if settings.background[3] > 0.0 {
        frame.composite_over(settings.background)
    } else {
        frame
    };
    io::write_image(&frame, output_path)?;
    log::info!("Wrote {} in {:.2?} total.", output_path.display(), start.elapsed());
    Ok(())
}

fn main() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} {}", args[0], USAGE);
        std::process::exit(1);
    }

    let overrides = match parse_overrides(&args[3..]) {
        Ok(overrides) => overrides,
        Err(message) => {
            eprintln!("{} {}\nUsage: {} {}", style("error:").red().bold(), message, args[0], USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(Path::new(&args[1]), Path::new(&args[2]), &overrides) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}
