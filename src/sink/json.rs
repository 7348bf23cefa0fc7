use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use anyhow::Result;
use log::debug;
use super::{Args, Report};

/// Writes each report as JSON, to a file (replaced every time) or stdout.
#[derive(Debug)]
pub struct JsonSink {
    path:   Option<PathBuf>,
    pretty: bool,
}

impl JsonSink {
    pub fn new(args: Args) -> Result<Self> {
        let path   = args.opt("path").map(PathBuf::from);
        let pretty = args.flag("pretty")?;
        Ok(Self { path, pretty })
    }

    pub fn to_file(path: PathBuf) -> Self {
        Self { path: Some(path), pretty: true }
    }

    pub fn send(&self, report: &Report<'_>) -> Result<()> {
        match &self.path {
            Some(path) => {
                let mut w = BufWriter::new(File::create(path)?);
                self.write(&mut w, report)?;
                w.flush()?;
                debug!("wrote {} records to {}", report.records.len(), path.display());
            }
            None => {
                let stdout = io::stdout();
                let mut w = stdout.lock();
                self.write(&mut w, report)?;
                w.flush()?;
            }
        }
        Ok(())
    }

    fn write<W: Write>(&self, w: &mut W, report: &Report<'_>) -> Result<()> {
        match self.pretty {
            true  => serde_json::to_writer_pretty(&mut *w, report)?,
            false => serde_json::to_writer(&mut *w, report)?,
        }
        writeln!(w)?;
        Ok(())
    }
}
