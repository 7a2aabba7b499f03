//! Head pose and gaze estimation over still images.

use anyhow::{Context, Result};
use clap::Parser;
use head_pose_gaze::{config::EXAMPLE_CONFIG, Config, HeadPoseEstimation};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Images to process, in order
    #[arg(required_unless_present = "print_config")]
    images: Vec<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Camera focal length in pixels (overrides the configuration)
    #[arg(short, long)]
    focal_length: Option<f64>,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(focal_length) = args.focal_length {
        config.camera.focal_length = focal_length;
    }

    let mut estimator = HeadPoseEstimation::from_config(&config).context("Failed to create estimator")?;

    for path in &args.images {
        let frame = image::open(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .to_rgb8();
        let faces = estimator.update(&frame);
        println!("{}: {faces} face(s)", path.display());

        for (i, pose) in estimator.poses().into_iter().enumerate() {
            let pose = match pose {
                Ok(pose) => pose,
                Err(e) => {
                    println!("  face {i}: {e}");
                    continue;
                }
            };
            let t = pose.translation();
            println!("  face {i}: translation ({:.3}, {:.3}, {:.3}) m", t.x, t.y, t.z);
            println!("  pose matrix:{}", pose.matrix());

            let gaze = pose.gaze();
            if let Some(p) = gaze.screen_point {
                println!("  facing camera plane at ({:.3}, {:.3}) m", p.x, p.y);
            }
            if let Some(pupils) = estimator.pupils(i)? {
                println!(
                    "  pupils: left ({:+.2}, {:+.2}), right ({:+.2}, {:+.2})",
                    pupils.left.x, pupils.left.y, pupils.right.x, pupils.right.y
                );
            }
        }
    }

    Ok(())
}
