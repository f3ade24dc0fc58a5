use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "as400-mcp",
    version,
    about = "MCP server exposing an IBM i (AS400) system to coding assistants",
    after_help = r#"Configuration is read from the environment (optionally via a .env file):
  AS400_CONNECTION_STRING   ODBC descriptor, e.g. DRIVER={IBM i Access ODBC Driver};SYSTEM=HOST;UID=USER;PWD=PASS;CCSID=1208;EXTCOLINFO=1
  AS400_FTP_HOST/USER/PASSWORD   optional FTP overrides for legacy-encoding uploads

Examples:
  as400-mcp mcp-serve
  as400-mcp request --method list_libraries --params '{"pattern":"DEV%"}'
  as400-mcp request --method get_source --params '{"library":"DEV","source_file":"QRPGSRC","member":"ORD100"}'
  as400-mcp serve
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run MCP server over stdio.
    McpServe,
    /// Run JSONL RPC server over stdin/stdout.
    Serve,
    /// Run a single method and exit.
    Request {
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, value_name = "PATH")]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        id: String,
    },
}
