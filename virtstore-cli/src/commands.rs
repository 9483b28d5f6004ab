//! Subcommand execution.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use virtstore_binding::{
    Class, Connection, PoolInfo, Runtime, StoragePool, StorageVol, Value, VolInfo,
};

use crate::cli::{Command, OutputFormat};

/// Row of `pool-list`.
#[derive(Debug, Serialize)]
struct PoolRow {
    name: String,
    uuid: String,
    active: bool,
    persistent: bool,
    autostart: bool,
    #[serde(flatten)]
    info: PoolInfo,
}

/// Row of `vol-list` and body of `vol-info`.
#[derive(Debug, Serialize)]
struct VolRow {
    name: String,
    key: String,
    path: String,
    #[serde(flatten)]
    info: VolInfo,
}

/// Row of `methods`.
#[derive(Debug, Serialize)]
struct MethodRow {
    class: &'static str,
    method: &'static str,
    native: Option<&'static str>,
    arity: String,
}

/// Row of `constants`.
#[derive(Debug, Serialize)]
struct ConstantRow {
    class: &'static str,
    name: &'static str,
    value: i64,
}

/// Runs one subcommand and prints its result.
pub struct Executor {
    runtime: Runtime,
    uri: String,
    output: OutputFormat,
}

impl Executor {
    pub fn new(uri: &str, output: OutputFormat) -> Self {
        Self {
            runtime: Runtime::new(),
            uri: uri.to_string(),
            output,
        }
    }

    pub fn run(&self, command: &Command) -> Result<()> {
        match command {
            Command::Methods { class } => self.methods(class.as_deref()),
            Command::Constants => self.constants(),
            _ => {
                let conn = Connection::open(&self.uri)
                    .with_context(|| format!("Failed to open {}", self.uri))?;
                let result = self.run_connected(command, &conn);
                conn.close()?;
                result
            }
        }
    }

    fn run_connected(&self, command: &Command, conn: &Arc<Connection>) -> Result<()> {
        match command {
            Command::PoolList { all } => self.pool_list(conn, *all),
            Command::PoolInfo { pool } => {
                let pool = conn.lookup_storage_pool_by_name(pool)?;
                let row = pool_row(&pool)?;
                self.print(&row, || pool_text(&row))
            }
            Command::VolList { pool } => self.vol_list(conn, pool),
            Command::VolInfo { pool, volume } => {
                let pool = conn.lookup_storage_pool_by_name(pool)?;
                let vol = pool.lookup_volume_by_name(volume)?;
                let row = vol_row(&vol)?;
                self.print(&row, || vol_text(&row))
            }
            Command::PoolDefine { file } => {
                let xml = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let pool = conn.define_storage_pool_xml(&xml, 0)?;
                let name = pool.name()?;
                info!(pool = %name, "Pool defined");
                self.print(&name, || format!("Pool {} defined", name))
            }
            Command::PoolCreate { file } => {
                let xml = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let pool = conn.create_storage_pool_xml(&xml, 0)?;
                let name = pool.name()?;
                info!(pool = %name, "Pool created");
                self.print(&name, || format!("Pool {} created", name))
            }
            Command::Call {
                target,
                method,
                args,
            } => {
                let receiver = self.target(conn, target)?;
                let args: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
                debug!(target = %target, method = %method, "Calling");
                let result = self.runtime.call(&receiver, method, &args)?;
                self.print(&result, || result.to_string())
            }
            Command::Methods { .. } | Command::Constants => Ok(()),
        }
    }

    fn pool_list(&self, conn: &Arc<Connection>, all: bool) -> Result<()> {
        let mut names = conn.list_storage_pools()?;
        if all {
            names.extend(conn.list_defined_storage_pools()?);
        }

        let rows = names
            .iter()
            .map(|name| pool_row(&conn.lookup_storage_pool_by_name(name)?))
            .collect::<Result<Vec<_>>>()?;

        self.print(&rows, || {
            let mut out = format!(
                "{:<20} {:<12} {:<10} {:>16} {:>16}",
                "NAME", "STATE", "AUTOSTART", "CAPACITY", "AVAILABLE"
            );
            for row in &rows {
                out.push_str(&format!(
                    "\n{:<20} {:<12} {:<10} {:>16} {:>16}",
                    row.name,
                    row.info.state.as_str(),
                    if row.autostart { "yes" } else { "no" },
                    row.info.capacity,
                    row.info.available
                ));
            }
            out
        })
    }

    fn vol_list(&self, conn: &Arc<Connection>, pool: &str) -> Result<()> {
        let pool = conn.lookup_storage_pool_by_name(pool)?;
        let rows = pool
            .list_volumes()?
            .iter()
            .map(|name| vol_row(&pool.lookup_volume_by_name(name)?))
            .collect::<Result<Vec<_>>>()?;

        self.print(&rows, || {
            let mut out = format!("{:<24} {:<8} {:>16} {}", "NAME", "TYPE", "CAPACITY", "PATH");
            for row in &rows {
                out.push_str(&format!(
                    "\n{:<24} {:<8} {:>16} {}",
                    row.name,
                    row.info.kind.as_str(),
                    row.info.capacity,
                    row.path
                ));
            }
            out
        })
    }

    fn methods(&self, class: Option<&str>) -> Result<()> {
        let classes = match class {
            Some(name) => {
                let class =
                    Class::from_name(name).ok_or_else(|| anyhow!("Unknown class {}", name))?;
                vec![class]
            }
            None => Class::ALL.to_vec(),
        };

        let rows: Vec<MethodRow> = classes
            .into_iter()
            .flat_map(|c| self.runtime.methods(c))
            .map(|d| MethodRow {
                class: d.class.name(),
                method: d.name,
                native: d.native,
                arity: if d.optional == 0 {
                    d.required.to_string()
                } else {
                    format!("{}..{}", d.required, d.required + d.optional)
                },
            })
            .collect();

        self.print(&rows, || {
            rows.iter()
                .map(|r| {
                    format!(
                        "{}#{:<30} {:<6} {}",
                        r.class,
                        r.method,
                        r.arity,
                        r.native.unwrap_or("-")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    fn constants(&self) -> Result<()> {
        let rows: Vec<ConstantRow> = Class::ALL
            .iter()
            .flat_map(|c| self.runtime.constants(*c))
            .map(|c| ConstantRow {
                class: c.class.name(),
                name: c.name,
                value: c.value,
            })
            .collect();

        self.print(&rows, || {
            rows.iter()
                .map(|r| format!("{}::{} = {}", r.class, r.name, r.value))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Resolve a `call` target to a receiver value.
    fn target(&self, conn: &Arc<Connection>, target: &str) -> Result<Value> {
        let conn_value = Value::Connect(Arc::clone(conn));

        if target == "conn" {
            return Ok(conn_value);
        }

        if let Some(pool) = target.strip_prefix("pool:") {
            return Ok(self.runtime.call(
                &conn_value,
                "lookup_storage_pool_by_name",
                &[Value::from(pool)],
            )?);
        }

        if let Some(rest) = target.strip_prefix("vol:") {
            let (pool, vol) = rest
                .split_once('/')
                .ok_or_else(|| anyhow!("Volume target must be vol:<pool>/<name>"))?;
            let pool = self.runtime.call(
                &conn_value,
                "lookup_storage_pool_by_name",
                &[Value::from(pool)],
            )?;
            return Ok(self
                .runtime
                .call(&pool, "lookup_volume_by_name", &[Value::from(vol)])?);
        }

        bail!("Unknown target '{}' (expected conn, pool:<name> or vol:<pool>/<name>)", target)
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Text => {
                let text = text();
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
        }
        Ok(())
    }
}

fn pool_row(pool: &StoragePool) -> Result<PoolRow> {
    Ok(PoolRow {
        name: pool.name()?,
        uuid: pool.uuid()?,
        active: pool.is_active()?,
        persistent: pool.is_persistent()?,
        autostart: pool.autostart()?,
        info: pool.info()?,
    })
}

fn pool_text(row: &PoolRow) -> String {
    format!(
        "Name:        {}\nUUID:        {}\nState:       {}\nPersistent:  {}\nAutostart:   {}\n\
         Capacity:    {}\nAllocation:  {}\nAvailable:   {}",
        row.name,
        row.uuid,
        row.info.state.as_str(),
        if row.persistent { "yes" } else { "no" },
        if row.autostart { "yes" } else { "no" },
        row.info.capacity,
        row.info.allocation,
        row.info.available
    )
}

fn vol_row(vol: &StorageVol) -> Result<VolRow> {
    Ok(VolRow {
        name: vol.name()?,
        key: vol.key()?,
        path: vol.path()?,
        info: vol.info()?,
    })
}

fn vol_text(row: &VolRow) -> String {
    format!(
        "Name:        {}\nKey:         {}\nPath:        {}\nType:        {}\n\
         Capacity:    {}\nAllocation:  {}",
        row.name,
        row.key,
        row.path,
        row.info.kind.as_str(),
        row.info.capacity,
        row.info.allocation
    )
}

/// Read one `call` argument: nil, true, false, an integer, or a string.
pub fn parse_arg(raw: &str) -> Value {
    match raw {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::from(raw)),
    }
}
