//! Command execution.

use crate::config::Config;
use crate::identity;
use crate::Commands;
use colored::Colorize;
use rshcp_client::{parse_user_host, ExecRequest, RemoteTarget};
use tokio::io::AsyncReadExt;

/// Executes a command and returns the bytes to write to stdout.
pub async fn execute(config: &Config, cmd: Commands) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let client = config.client();

    match cmd {
        Commands::Exec {
            destination,
            command,
            max_lines,
            max_bytes,
            tail,
        } => {
            let target = resolve_target(config, &destination)?;
            let request = ExecRequest::new(target, command.join(" "))
                .with_max_lines(max_lines.unwrap_or(config.defaults.max_lines))
                .with_max_bytes(max_bytes.unwrap_or(config.defaults.max_bytes))
                .with_tail(tail);

            let result = client.execute(&request).await?;
            if result.truncated {
                eprintln!(
                    "{}: output truncated to {} lines / {} bytes",
                    "Warning".yellow(),
                    request.line_limit(),
                    request.byte_limit()
                );
            }
            Ok(result.output.to_vec())
        }

        Commands::Read {
            destination,
            path,
            output,
        } => {
            let target = resolve_target(config, &destination)?;
            let data = client.read_file(&target, &path).await?;

            match output {
                Some(file) => {
                    tokio::fs::write(&file, &data).await?;
                    Ok(format!(
                        "{} {} bytes to {}\n",
                        "Wrote".green(),
                        data.len(),
                        file.display()
                    )
                    .into_bytes())
                }
                None => Ok(data.to_vec()),
            }
        }

        Commands::Write {
            destination,
            path,
            input,
            content,
        } => {
            let target = resolve_target(config, &destination)?;
            let data = match (input, content) {
                (Some(file), _) => tokio::fs::read(&file).await?,
                (None, Some(text)) => text.into_bytes(),
                (None, None) => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };

            client.write_file(&target, &path, &data).await?;
            Ok(format!("{}\n", "File written successfully".green()).into_bytes())
        }

        Commands::Config => Ok(config.to_yaml()?.into_bytes()),
    }
}

/// Resolves `[user@]host` into a target using the configured defaults.
///
/// The local user comes from the configuration or the process owner; the
/// remote user defaults to the configured user, then to the local user.
pub fn resolve_target(
    config: &Config,
    destination: &str,
) -> Result<RemoteTarget, Box<dyn std::error::Error>> {
    let local_user = match &config.defaults.local_user {
        Some(user) => user.clone(),
        None => identity::current_user().ok_or("cannot determine the local user name")?,
    };
    let ambient = config.defaults.user.as_deref().unwrap_or(&local_user);

    let (remote_user, host) = parse_user_host(destination, ambient)?;
    Ok(RemoteTarget::new(
        host,
        config.defaults.port,
        remote_user,
        local_user,
    )?)
}
