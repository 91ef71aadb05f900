#[cfg(not(target_arch = "wasm32"))]
use fluidbg::sim::{config::FluidConfig, profile::DeviceHint};

/// `--mobile` and `--touch` pick the lower quality tiers; `-v` enables debug logs.
#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    let mut hint = DeviceHint::default();
    let mut level = log::LevelFilter::Info;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--mobile" => hint.is_mobile = true,
            "--touch" => hint.is_touch = true,
            "-v" | "--verbose" => level = log::LevelFilter::Debug,
            other => anyhow::bail!("unknown argument `{other}`"),
        }
    }
    fluidbg::init_logging(level)?;
    fluidbg::run(hint, FluidConfig::default())
}

// The web build is driven through `start` or `FluidBackground`.
#[cfg(target_arch = "wasm32")]
fn main() {}
