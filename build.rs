// build.rs
//
// Stamps the build time into the binary, the startup banner prints it.

use chrono::Utc;
use std::env;
use std::fs;
use std::io;
use std::path::Path;

fn main() -> io::Result<()> {
    let out_dir = env::var("OUT_DIR").map_err(io::Error::other)?;
    let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

    fs::write(
        Path::new(&out_dir).join("build_info.rs"),
        format!("pub const BUILD_DATE: &str = \"{}\";\n", stamp),
    )?;

    // only restamp when the script itself changes
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
