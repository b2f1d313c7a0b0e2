// src/main.rs
use std::path::PathBuf;

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sliderbot::config::SimConfig;
use sliderbot::logic::{load_or_derive, simulate};
use sliderbot::persist::save_equation;
use sliderbot::ui::{save_plot, simulate_handler};

#[derive(Parser, Debug)]
#[command(name = "sliderbot-sim", about = "sliderbot simulator")]
struct Args {
    /// Gravitational acceleration
    #[arg(long, default_value_t = 10.0)]
    g: f64,
    /// Pendulum length, pivot to wheel center
    #[arg(long, default_value_t = 1.0)]
    r: f64,
    /// Reaction wheel radius
    #[arg(long = "L", default_value_t = 0.1)]
    l: f64,
    /// Wheel mass
    #[arg(long, default_value_t = 1.0)]
    mp: f64,
    /// Cart mass
    #[arg(long, default_value_t = 1.0)]
    mc: f64,
    /// Simulation runtime
    #[arg(long, default_value_t = 10.0)]
    tf: f64,
    /// Simulation timestep
    #[arg(long, default_value_t = 0.01)]
    dt: f64,
    /// Initial condition CSV: phi,theta,x,phidot,thetadot,xdot
    #[arg(long, default_value = "0.1,0,0,0,0,0", allow_hyphen_values = true)]
    x0: String,
    /// Saved sliderbot equation to load instead of deriving
    #[arg(long = "fn")]
    equation_file: Option<PathBuf>,
    /// Treat the control output as a motor voltage
    #[arg(long)]
    mtr: bool,
    /// Full motor dynamics (not implemented)
    #[arg(long)]
    full_mtr: bool,
    /// Proportional gain
    #[arg(long, default_value_t = 10.0)]
    kp: f64,
    /// Derivative gain
    #[arg(long, default_value_t = 1.0)]
    kd: f64,
    /// Motor coil resistance
    #[arg(long, default_value_t = 1.0)]
    motor_r: f64,
    /// Motor constant
    #[arg(long, default_value_t = 0.1)]
    motor_k: f64,
    /// Motor inductance
    #[arg(long, default_value_t = 1e-3)]
    motor_l: f64,
    /// Write the equation in use to this file
    #[arg(long)]
    save: Option<PathBuf>,
    /// Output figure
    #[arg(long, default_value = "sliderbot.png")]
    plot: PathBuf,
    /// Serve the web front end on this address instead of running once
    #[arg(long)]
    serve: Option<String>,
}

impl Args {
    fn config(&self) -> SimConfig {
        SimConfig {
            g: self.g,
            r: self.r,
            l: self.l,
            mp: self.mp,
            mc: self.mc,
            tf: self.tf,
            dt: self.dt,
            x0: self.x0.clone(),
            equation_file: self.equation_file.clone(),
            mtr: self.mtr,
            full_mtr: self.full_mtr,
            kp: self.kp,
            kd: self.kd,
            motor_r: self.motor_r,
            motor_k: self.motor_k,
            motor_l: self.motor_l,
        }
    }
}

fn serve(addr: &str) -> Result<()> {
    info!("Serving sliderbot front end on http://{addr}");
    actix_web::rt::System::new().block_on(async {
        HttpServer::new(|| {
            App::new()
                .route("/simulate", web::post().to(simulate_handler))
                .service(Files::new("/", "static").index_file("index.html"))
        })
        .bind(addr)?
        .run()
        .await
    })?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    // Validation comes first so --full-mtr is refused in every mode.
    let cfg = args.config();
    cfg.validate()?;

    if let Some(addr) = &args.serve {
        return serve(addr);
    }

    let equation = load_or_derive(&cfg).context("cannot obtain sliderbot dynamics")?;
    if let Some(path) = &args.save {
        save_equation(path, &equation)
            .with_context(|| format!("cannot save equation to {}", path.display()))?;
    }
    let traj = simulate(&cfg, &equation)?;
    save_plot(&args.plot, &traj, cfg.r, cfg.l)
        .with_context(|| format!("cannot write {}", args.plot.display()))?;
    info!("Done!");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run(&Args::parse())
}
