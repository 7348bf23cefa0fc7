use std::io::{self, Write};
use std::str::FromStr;
use anyhow::{anyhow, Error, Result};
use super::{Args, JsonSink, Report};

pub enum Sink {
    Json(JsonSink),
    Stdout,
}

impl Sink {
    pub fn send(&self, report: &Report<'_>) -> Result<()> {
        match self {
            Self::Json(s) => s.send(report)?,
            Self::Stdout  => table(&mut io::stdout().lock(), report)?,
        }
        Ok(())
    }
}

fn table<W: Write>(w: &mut W, report: &Report<'_>) -> Result<()> {
    let stats = report.stats;

    writeln!(w, "{} [{}]", report.hostname, report.driver)?;
    writeln!(
        w,
        "total {} | established {} | listening {} | suspicious {} | top {} ({} conns)",
        stats.total, stats.established, stats.listening, stats.suspicious,
        stats.top_process, stats.top_count,
    )?;
    writeln!(
        w,
        "{:<6}{:<48}{:<48}{:<13}{:>8}  {:<16}{}",
        "PROTO", "LOCAL ADDR", "REMOTE ADDR", "STATUS", "PID", "PROCESS", "RISK",
    )?;

    for r in &report.records {
        writeln!(
            w,
            "{:<6}{:<48}{:<48}{:<13}{:>8}  {:<16}{}",
            r.protocol, r.local.to_string(), r.remote.to_string(), r.state,
            r.pid, r.process, r.risk_reason(),
        )?;
    }

    w.flush()?;
    Ok(())
}

impl Default for Sink {
    fn default() -> Self {
        Self::Stdout
    }
}

impl FromStr for Sink {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match Args::parse(arg)? {
            ("json",    args) => json(args),
            ("stdout", _args) => Ok(Self::Stdout),
            _                 => Err(anyhow!("{}", arg)),
        }
    }
}

fn json(args: Args) -> Result<Sink> {
    Ok(Sink::Json(JsonSink::new(args)?))
}
