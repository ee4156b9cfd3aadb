// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use seismic_fdtd::io;
use seismic_fdtd::{
    ricker, Acquisition, Boundary, CpmlSettings, FdtdSolver, Medium, Receiver, ReceiverField,
    Shot, ShotProgress, Source, SourceFlag,
};

#[derive(Parser)]
#[command(
    name = "seismic-fdtd",
    about = "Staggered-grid FDTD seismic wave simulator"
)]
struct Cli {
    /// Grid size as nz,nx
    #[arg(short = 's', long)]
    size: String,

    /// Grid spacing in meters (uniform in z and x)
    #[arg(long, default_value = "10.0")]
    spacing: f64,

    /// Time step in seconds
    #[arg(long, default_value = "1e-3")]
    dt: f64,

    /// Number of time steps
    #[arg(short = 'n', long, default_value = "1000")]
    nt: usize,

    /// Medium: "uniform:<vp>,<rho>", "two-layer:<vp1>,<vp2>,<rho>,<interface_row>",
    /// or "velocity-file:<path>" (use --density for the constant density)
    #[arg(short = 'm', long, default_value = "uniform:2000,2000")]
    model: String,

    /// Constant density used with velocity-file models
    #[arg(long, default_value = "2000.0")]
    density: f64,

    /// Source position "x,z" in meters (repeatable)
    #[arg(long, num_args = 1)]
    source: Vec<String>,

    /// Source injection flag: p, p-rate, vx, or vz
    #[arg(long, default_value = "p")]
    source_flag: String,

    /// Receiver position "x,z" in meters (repeatable)
    #[arg(long, num_args = 1)]
    receiver: Vec<String>,

    /// Recorded field: p, vx, vz, or stress
    #[arg(long, default_value = "p")]
    record: String,

    /// Source wavelet: "ricker:<f0>"
    #[arg(short = 'w', long, default_value = "ricker:10")]
    wavelet: String,

    /// Boundary: "cpml:<thickness>" or "rigid"
    #[arg(short = 'b', long, default_value = "cpml:20")]
    boundary: String,

    /// Output sampling interval in seconds (defaults to the simulation dt)
    #[arg(long)]
    output_dt: Option<f64>,

    /// Output file path; gathers land at <stem>_shot<i>.npy
    #[arg(short = 'o', long, default_value = "gather.npy")]
    output: PathBuf,

    /// Number of worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Print per-shot progress to stderr
    #[arg(long)]
    progress: bool,
}

fn parse_pair(s: &str, what: &str) -> Result<(f64, f64)> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected two comma-separated numbers", what))?;
    if parts.len() != 2 {
        bail!("{} has {} components, expected 2", what, parts.len());
    }
    Ok((parts[0], parts[1]))
}

fn parse_size(s: &str) -> Result<(usize, usize)> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("invalid --size: expected nz,nx")?;
    if parts.len() != 2 {
        bail!("--size has {} components, expected 2", parts.len());
    }
    Ok((parts[0], parts[1]))
}

fn build_medium(cli: &Cli, nz: usize, nx: usize) -> Result<Medium> {
    let h = cli.spacing;
    if let Some(params) = cli.model.strip_prefix("uniform:") {
        let (vp, rho) = parse_pair(params, "--model uniform")?;
        return Medium::from_velocity(nz, nx, h, h, vec![vp; nz * nx], vec![rho; nz * nx])
            .map_err(|e| anyhow::anyhow!("{}", e));
    }

    if let Some(params) = cli.model.strip_prefix("two-layer:") {
        let parts: Vec<f64> = params
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("invalid two-layer model parameters")?;
        if parts.len() != 4 {
            bail!(
                "two-layer model expects 'two-layer:<vp1>,<vp2>,<rho>,<interface_row>', got '{}'",
                cli.model
            );
        }
        let (vp1, vp2, rho, interface) = (parts[0], parts[1], parts[2], parts[3] as usize);
        if interface >= nz {
            bail!("interface row {} is outside the grid (nz = {})", interface, nz);
        }
        let mut vp = vec![vp1; nz * nx];
        for iz in interface..nz {
            for ix in 0..nx {
                vp[iz * nx + ix] = vp2;
            }
        }
        return Medium::from_velocity(nz, nx, h, h, vp, vec![rho; nz * nx])
            .map_err(|e| anyhow::anyhow!("{}", e));
    }

    if let Some(path_str) = cli.model.strip_prefix("velocity-file:") {
        let vp = io::load_field(Path::new(path_str), "velocity", &[nz, nx])
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        return Medium::from_velocity(nz, nx, h, h, vp, vec![cli.density; nz * nx])
            .map_err(|e| anyhow::anyhow!("{}", e));
    }

    bail!(
        "unknown --model: '{}'. Expected 'uniform:<vp>,<rho>', \
         'two-layer:<vp1>,<vp2>,<rho>,<row>', or 'velocity-file:<path>'",
        cli.model
    );
}

fn parse_boundary(s: &str) -> Result<Boundary> {
    if s == "rigid" {
        return Ok(Boundary::Rigid);
    }
    if let Some(thickness) = s.strip_prefix("cpml:") {
        let thickness: usize = thickness
            .trim()
            .parse()
            .context("invalid CPML thickness")?;
        return Ok(Boundary::Cpml(CpmlSettings {
            thickness,
            ..CpmlSettings::default()
        }));
    }
    bail!("unknown --boundary: '{}'. Expected 'cpml:<thickness>' or 'rigid'", s);
}

fn parse_source_flag(s: &str) -> Result<SourceFlag> {
    match s {
        "p" => Ok(SourceFlag::Pressure),
        "p-rate" => Ok(SourceFlag::PressureRate),
        "vx" => Ok(SourceFlag::Vx),
        "vz" => Ok(SourceFlag::Vz),
        _ => bail!("unknown --source-flag: '{}'. Expected p, p-rate, vx, or vz", s),
    }
}

fn parse_record(s: &str) -> Result<ReceiverField> {
    match s {
        "p" => Ok(ReceiverField::Pressure),
        "vx" => Ok(ReceiverField::Vx),
        "vz" => Ok(ReceiverField::Vz),
        "stress" => Ok(ReceiverField::NormalStress),
        _ => bail!("unknown --record: '{}'. Expected p, vx, vz, or stress", s),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.source.is_empty() {
        bail!("at least one --source must be specified");
    }
    if cli.receiver.is_empty() {
        bail!("at least one --receiver must be specified");
    }

    let (nz, nx) = parse_size(&cli.size)?;
    let medium = build_medium(&cli, nz, nx)?;
    let boundary = parse_boundary(&cli.boundary)?;
    let flag = parse_source_flag(&cli.source_flag)?;
    let record = parse_record(&cli.record)?;

    let mut sources = Vec::new();
    for s in &cli.source {
        let (x, z) = parse_pair(s, "--source")?;
        sources.push(Source { x, z, flag });
    }
    let mut receivers = Vec::new();
    for r in &cli.receiver {
        let (x, z) = parse_pair(r, "--receiver")?;
        receivers.push(Receiver { x, z });
    }
    let num_sources = sources.len();

    let mut solver = FdtdSolver::new(medium, cli.dt, cli.nt)
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .with_boundary(boundary)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    if let Some(threads) = cli.threads {
        solver = solver.with_threads(threads);
    }
    if let Some(output_dt) = cli.output_dt {
        solver = solver
            .with_output_dt(output_dt)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }
    if cli.progress {
        solver = solver.with_progress(Box::new(|info: ShotProgress| {
            eprintln!(
                "[{:.1}s] shots_completed={} queued={} in_flight={}",
                info.elapsed.as_secs_f64(),
                info.shots_completed,
                info.queued,
                info.in_flight,
            );
        }));
    }

    solver
        .update_acquisition(Acquisition {
            shots: vec![Shot {
                sources,
                receivers,
                record,
            }],
        })
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let wavelet = if let Some(f0_str) = cli.wavelet.strip_prefix("ricker:") {
        let f0: f64 = f0_str.trim().parse().context("invalid Ricker frequency")?;
        if !f0.is_finite() || f0 <= 0.0 {
            bail!("Ricker frequency must be positive, got {}", f0);
        }
        ricker(f0, cli.dt, cli.nt)
    } else {
        bail!("unknown --wavelet: '{}'. Expected 'ricker:<f0>'", cli.wavelet);
    };
    solver
        .update_wavelets(vec![vec![wavelet; num_sources]])
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let gathers = solver.run().map_err(|e| anyhow::anyhow!("{}", e))?;
    io::save_gathers(&cli.output, &gathers).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
