// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use nvcal_core::{differ, master, printer, qcn, schema, transform, updater};
use std::fs;
use std::path::PathBuf;

/// Reads, writes, prints, and diffs Qualcomm radio calibration
/// configurations across the vendor XML, legacy QCN, and MBN wire formats.
#[derive(Parser)]
#[command(name = "nvcal", version)]
struct Cli {
    /// Schema XML defining the NV item/EFS item/data-type catalog.
    #[arg(short = 's', long)]
    schema: PathBuf,

    /// Print a file (QCN, XML, or MBN).
    #[arg(short = 'p', long, value_name = "FILE")]
    print: Option<PathBuf>,

    /// Emit an update script for a file; optionally redirected to a path.
    #[arg(short = 'u', long, num_args = 1..=2, value_names = ["FILE", "OUT.SH"])]
    update: Option<Vec<PathBuf>>,

    /// Compile an XML master file to a QCN.
    #[arg(short = 'c', long, num_args = 2, value_names = ["XML", "OUT.QCN"])]
    compile: Option<Vec<PathBuf>>,

    /// Diff two inputs after normalisation.
    #[arg(short = 'd', long, num_args = 2, value_names = ["A", "B"])]
    diff: Option<Vec<PathBuf>>,

    /// Diff executable to invoke.
    #[arg(short = 't', long, default_value = "diff")]
    diff_tool: String,

    /// Increase logging verbosity; repeatable. At level >= 1 the printer
    /// separates EFS stores rather than merging them.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run(&self) -> Result<i32> {
        let schema_xml = fs::read_to_string(&self.schema)
            .with_context(|| format!("reading schema {}", self.schema.display()))?;
        let schema_result = schema::parse(&schema_xml);
        for e in &schema_result.errors {
            eprintln!("schema warning: {e}");
        }
        let catalog = schema_result.catalog;

        if let Some(path) = &self.print {
            let document = nvcal_core::load_document(path, &catalog)?;
            print!("{}", printer::print_document(&document, &catalog, self.verbose));
            return Ok(0);
        }

        if let Some(paths) = &self.update {
            let document = nvcal_core::load_document(&paths[0], &catalog)?;
            let script = updater::render_update_script(&document);
            match paths.get(1) {
                Some(out) => fs::write(out, script).with_context(|| format!("writing {}", out.display()))?,
                None => print!("{script}"),
            }
            return Ok(0);
        }

        if let Some(paths) = &self.compile {
            let (xml, out) = (&paths[0], &paths[1]);
            if out.extension().and_then(|e| e.to_str()) != Some("qcn") {
                return Err(anyhow!("--compile output must have a .qcn extension"));
            }
            let loaded = master::load_master_file(xml).with_context(|| format!("loading {}", xml.display()))?;
            for e in &loaded.errors {
                eprintln!("master warning: {e}");
            }
            let document = transform::transform_master(&catalog, loaded.nv_values.into_values(), loaded.efs_values.into_values());
            qcn::write_qcn(&document, out, qcn::WriteOptions::default())?;
            return Ok(0);
        }

        if let Some(paths) = &self.diff {
            let code = differ::diff_files(&paths[0], &paths[1], &catalog, &self.diff_tool, self.verbose)?;
            return Ok(code);
        }

        Err(anyhow!("no operation requested: pass one of --print, --update, --compile, --diff"))
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str())).init();

    let exit_code = match cli.run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            -1
        }
    };

    std::process::exit(exit_code)
}
