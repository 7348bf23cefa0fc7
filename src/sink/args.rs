use std::collections::HashMap;
use anyhow::{anyhow, Result};

/// `name,key=value,...` sink options.
#[derive(Debug)]
pub struct Args {
    args: HashMap<String, String>,
}

impl Args {
    pub fn parse(args: &str) -> Result<(&str, Self)> {
        let mut split = args.splitn(2, ',');
        let sink = split.next().unwrap_or("");
        let rest = split.next().unwrap_or("");

        let args = rest.split(',').filter(|s| !s.is_empty()).map(|str| {
            match str.split_once('=') {
                Some((k, v)) => Ok((k.to_owned(), v.to_owned())),
                None         => Err(anyhow!("invalid sink arg '{}'", str)),
            }
        }).collect::<Result<HashMap<_, _>>>()?;

        Ok((sink, Self { args }))
    }

    pub fn opt(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.opt(name) {
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") | None => Ok(false),
            Some(value) => Err(anyhow!("invalid value for '{}': {}", name, value)),
        }
    }
}
