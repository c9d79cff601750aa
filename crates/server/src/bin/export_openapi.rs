// Export OpenAPI specification as JSON
//
// Usage: cargo run --bin export-openapi > openapi.json

use jobflow_server::openapi::ApiDoc;

fn main() -> anyhow::Result<()> {
    println!("{}", ApiDoc::to_json()?);
    Ok(())
}
