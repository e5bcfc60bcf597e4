// Copyright @yucwang 2026

use volmarch::io::load_header;
use volmarch::io::packer::{Normalization, PackOptions, VolumeDataPacker};

use std::path::Path;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <volume.mhd|mha|vol> [--range]", args[0]);
        std::process::exit(1);
    }

    let header = match load_header(Path::new(&args[1])) {
        Ok(header) => header,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args[1], e);
            std::process::exit(1);
        }
    };
    println!("{}", header.describe());

    if args.iter().skip(2).any(|a| a == "--range") {
        let options = PackOptions { normalization: Normalization::DataRange, ..PackOptions::default() };
        let result = VolumeDataPacker::new(&header, options).and_then(|packer| {
            let mut reader = volmarch::io::open_payload(&header)?;
            packer.pack(&mut reader, |_, _| Ok(()))
        });
        match result {
            Ok(summary) => println!("Value range : [{}, {}]", summary.value_range.0, summary.value_range.1),
            Err(e) => {
                eprintln!("Failed to scan payload: {}", e);
                std::process::exit(1);
            }
        }
    }
}
