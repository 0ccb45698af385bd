// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polysnap CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{Point3, Vector3};
use polysnap::snap::{CheckpointSink, SearchableSphere, TriSurface};
use polysnap::{MeshReport, PolyMesh, RefinementSurfaces, SnapConfig, SnapDriver, SnapReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "polysnap")]
#[command(about = "Polysnap - snap a block mesh boundary onto a surface", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the quality of a unit block mesh
    Check {
        /// Cells per direction
        #[arg(short, long, default_value = "8")]
        cells: usize,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Snap the boundary of a unit block mesh onto a surface
    Snap {
        /// Cells per direction
        #[arg(short, long, default_value = "8")]
        cells: usize,

        /// STL surface to snap to
        #[arg(long, conflicts_with = "sphere", required_unless_present = "sphere")]
        surface: Option<PathBuf>,

        /// Snap to a sphere of this radius around the block centre
        #[arg(long)]
        sphere: Option<f64>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the intermediate point positions as JSON into this directory
        #[arg(long)]
        debug_dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Check { cells, config, json } => {
            check_command(*cells, config.as_deref(), *json)?;
        }
        Commands::Snap {
            cells,
            surface,
            sphere,
            config,
            debug_dir,
            json,
        } => {
            snap_command(
                *cells,
                surface.as_deref(),
                *sphere,
                config.as_deref(),
                debug_dir.as_deref(),
                *json,
            )?;
        }
        Commands::Version => {
            println!("Polysnap v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SnapConfig> {
    match path {
        Some(path) => SnapConfig::from_file(path),
        None => SnapConfig::load(),
    }
}

fn unit_block(cells: usize) -> Result<PolyMesh> {
    if cells == 0 {
        bail!("the block needs at least one cell per direction");
    }
    PolyMesh::block([cells; 3], Point3::origin(), Point3::new(1.0, 1.0, 1.0))
        .context("Failed to build block mesh")
}

fn check_command(cells: usize, config: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let mesh = unit_block(cells)?;
    let report = MeshReport::new(&mesh, &config.quality);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_mesh_report(&report);
    }
    Ok(())
}

fn snap_command(
    cells: usize,
    surface: Option<&Path>,
    sphere: Option<f64>,
    config: Option<&Path>,
    debug_dir: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let mesh = unit_block(cells)?;

    let mut surfaces = RefinementSurfaces::new();
    match (surface, sphere) {
        (Some(path), _) => {
            let tri = TriSurface::from_stl(path)
                .with_context(|| format!("Failed to read surface {:?}", path))?;
            surfaces.add(Box::new(tri), None);
        }
        (None, Some(radius)) => {
            if radius <= 0.0 {
                bail!("sphere radius must be positive, got {}", radius);
            }
            surfaces.add(
                Box::new(SearchableSphere::new("sphere", Point3::new(0.5, 0.5, 0.5), radius)),
                None,
            );
        }
        (None, None) => bail!("either --surface or --sphere is required"),
    }

    let mut driver = SnapDriver::new(&surfaces, config);
    if let Some(dir) = debug_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create debug directory {:?}", dir))?;
        driver = driver.with_checkpoint(JsonCheckpoint::new(dir));
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Snapping {} cells", mesh.n_cells()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let start = std::time::Instant::now();
    let patches: Vec<usize> = (0..mesh.patches().len()).collect();
    let result = driver.do_snap(mesh, &patches);
    pb.finish_and_clear();
    let (snapped, report) = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_snap_report(&report, &snapped, start.elapsed());
    }
    Ok(())
}

fn print_mesh_report(report: &MeshReport) {
    println!("\n{}", "Mesh".bold());
    println!("  Points:          {}", report.n_points);
    println!("  Faces:           {} ({} internal)", report.n_faces, report.n_internal_faces);
    println!("  Cells:           {}", report.n_cells);
    println!(
        "  Shapes:          hex {} prism {} wedge {} pyramid {} tet {} poly {}",
        report.cell_shapes.hex,
        report.cell_shapes.prism,
        report.cell_shapes.wedge,
        report.cell_shapes.pyramid,
        report.cell_shapes.tet,
        report.cell_shapes.polyhedron
    );

    println!("\n{}", "Quality".bold());
    println!("  Max non-ortho:   {:.3} deg", report.max_non_ortho);
    println!("  Max skewness:    {:.4}", report.max_skewness);
    println!("  Min face weight: {:.4}", report.min_face_weight);
    println!("  Min vol ratio:   {:.4}", report.min_vol_ratio);
    println!("  Min volume:      {:.4e}", report.min_volume);
    println!("  Total volume:    {:.6}", report.total_volume);
    println!("  Min determinant: {:.4}", report.min_determinant);
    println!("  Max aspect:      {:.4}", report.max_aspect_ratio);

    let wrong = if report.n_wrong_faces > 0 {
        report.n_wrong_faces.to_string().red()
    } else {
        report.n_wrong_faces.to_string().green()
    };
    println!("  Failing faces:   {}", wrong);
}

fn print_snap_report(report: &SnapReport, mesh: &PolyMesh, elapsed: Duration) {
    println!("\n{}", "Snap".bold());
    println!("  Cells:           {}", mesh.n_cells());
    println!("  Initial errors:  {}", report.n_initial_errors);
    for (i, ok) in report.iterations.iter().enumerate() {
        let status = if *ok { "ok".green() } else { "failed".red() };
        println!("  Iteration {}:     {}", i, status);
    }
    println!("  Baffles:         {}", report.n_baffles);
    println!("  Repatched faces: {}", report.n_repatched);
    println!("  Merged faces:    {}", report.n_merged_faces);
    println!("  Removed points:  {}", report.n_removed_points);

    let final_errors = if report.n_final_errors > report.n_initial_errors {
        report.n_final_errors.to_string().red()
    } else {
        report.n_final_errors.to_string().green()
    };
    println!("  Final errors:    {}", final_errors);
    println!("  Time:            {:.2?}", elapsed);
}

#[derive(Serialize)]
struct CheckpointRecord<'a> {
    label: &'a str,
    points: Vec<[f64; 3]>,
    displacement: Option<Vec<[f64; 3]>>,
}

/// Writes every checkpoint as a numbered JSON file
struct JsonCheckpoint {
    dir: PathBuf,
    count: usize,
}

impl JsonCheckpoint {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            count: 0,
        }
    }

    fn write(&self, path: &Path, record: &CheckpointRecord) -> Result<()> {
        let content = serde_json::to_string(record)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}

impl CheckpointSink for JsonCheckpoint {
    fn checkpoint(&mut self, label: &str, mesh: &PolyMesh, displacement: Option<&[Vector3<f64>]>) {
        let record = CheckpointRecord {
            label,
            points: mesh.points().iter().map(|p| [p.x, p.y, p.z]).collect(),
            displacement: displacement.map(|d| d.iter().map(|v| [v.x, v.y, v.z]).collect()),
        };
        let path = self.dir.join(format!("{:03}_{}.json", self.count, label));
        self.count += 1;

        if let Err(e) = self.write(&path, &record) {
            log::warn!("{}", e);
        }
    }
}
