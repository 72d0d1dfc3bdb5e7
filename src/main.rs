use clap::Parser;
use statewalk::Crawl;

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    ::log::info!("Starting crawl of {}", args.url);
    println!("Note: crawling requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    let start_time = std::time::Instant::now();

    let crawl = Crawl::new(&args.url)
        .with_config(args.to_config())
        .with_on_result(Box::new(|state| {
            ::log::info!("Discovered state {} at {}", &state.unique_id[..12], state.url);
        }));

    let graph = match crawl.run().await {
        Ok(graph) => graph,
        Err(e) => {
            ::log::error!("Crawl failed: {}", e);
            return;
        }
    };

    let duration = start_time.elapsed();
    println!(
        "Crawl complete: {} states, {} transitions in {:.2} seconds",
        graph.vertex_count(),
        graph.edge_count(),
        duration.as_secs_f64()
    );

    if let Some(path) = &args.graph_out {
        if let Err(e) = std::fs::write(path, graph.to_dot()) {
            ::log::error!("Failed to write graph to {}: {}", path, e);
        } else {
            println!("Crawl graph written to {}", path);
        }
    }
}
