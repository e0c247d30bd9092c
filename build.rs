// build.rs

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/shader.vert", "shaders/vert.spv"),
    ("shaders/shader.frag", "shaders/frag.spv"),
];

fn main() {
    for (source, output) in SHADERS {
        println!("cargo::rerun-if-changed={}", source);

        if !Path::new(source).exists() {
            continue;
        }

        // The renderer reads the SPIR-V at startup, so a missing compiler is
        // reported there rather than failing the build.
        match Command::new("glslc").args([source, "-o", output]).status() {
            Err(err) => {
                println!("cargo::warning=glslc unavailable ({}), {} not compiled", err, source);
            }
            Ok(status) if !status.success() => {
                println!("cargo::warning=glslc failed on {} ({})", source, status);
            }
            Ok(_) => {}
        }
    }
}
