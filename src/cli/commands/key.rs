//! Cache key codec commands.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::CacheKey;

#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub command: KeyCommands,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Split a key into its fields
    Parse {
        /// Flat cache key
        key: String,
    },
    /// Build a key from its fields
    Encode {
        #[arg(long)]
        provider: String,
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        name: String,
        /// Trailing fields after the name (repeatable)
        #[arg(long = "extra")]
        extra: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct KeyOutput {
    pub key: String,
    pub fields: CacheKey,
}

impl CommandOutput for KeyOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Key:      {}", self.key),
            format!("Provider: {}", self.fields.provider),
            format!("Type:     {}", self.fields.type_name),
            format!("Account:  {}", self.fields.account),
            format!("Location: {}", self.fields.location),
            format!("Name:     {}", self.fields.name),
        ];
        if !self.fields.extra.is_empty() {
            lines.push(format!("Extra:    {}", self.fields.extra.join(", ")));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: KeyArgs, json_mode: bool) -> Result<()> {
    let out = match args.command {
        KeyCommands::Parse { key } => {
            let Some(fields) = CacheKey::parse(&key) else {
                bail!("'{key}' is not a valid cache key (expected provider:type:account:location:name)");
            };
            KeyOutput { key, fields }
        }
        KeyCommands::Encode {
            provider,
            type_name,
            account,
            location,
            name,
            extra,
        } => {
            let fields = extra.into_iter().fold(
                CacheKey::new(provider, type_name, account, location, name),
                |key, field| key.with_extra(field),
            );
            if CacheKey::parse(&fields.encode()).is_none() {
                bail!("provider, type, account, location and name must all be non-empty");
            }
            KeyOutput {
                key: fields.encode(),
                fields,
            }
        }
    };

    output(&out, json_mode);
    Ok(())
}
