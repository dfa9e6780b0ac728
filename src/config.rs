use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "causalkv", about = "Causally consistent replicated key-value node")]
pub struct CliArgs {
    /// Identifier of this node. Must be one of the ids in --peers.
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Socket address to serve the HTTP API on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8001")]
    pub listen_addr: String,

    /// Full membership as comma-separated `id=base_url` pairs, self included.
    /// Example: n1=http://localhost:8001,n2=http://localhost:8002
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,
}
