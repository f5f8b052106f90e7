mod actions;
mod cli;
mod config;
mod controls;
mod fingers;
mod gestures;
mod hysteresis;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod session;
mod smoothing;
mod tracker;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
