use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use catalog_browser::app::CatalogBrowserApp;
use catalog_browser::client::HttpCatalogApi;
use catalog_browser::config::{data_path_from_env, ClientConfig, ServerConfig};
use catalog_browser::model::{ItemsQuery, SortKey, SortOrder};
use catalog_browser::query::run_query;
use catalog_browser::server;
use catalog_browser::store::CatalogStore;
use catalog_browser::ui_model::{category_label, format_price};

#[derive(Parser, Debug)]
#[command(name = "catalogbrowser")]
#[command(about = "Paginated item catalog: HTTP server, CLI and desktop browser")]
struct Args {
    /// Case-insensitive name filter.
    #[arg(default_value = "")]
    query: String,
    /// Serve the catalog API instead of opening the browser.
    #[arg(long, default_value_t = false, conflicts_with = "cli")]
    serve: bool,
    /// Print one page from the data file and exit.
    #[arg(long, default_value_t = false)]
    cli: bool,
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    api: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long, default_value = "name")]
    sort_key: String,
    #[arg(long, default_value = "asc")]
    sort_order: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn items_query(args: &Args, default_limit: u32) -> Result<ItemsQuery> {
    let Some(sort_key) = SortKey::parse(&args.sort_key) else {
        bail!("unknown sort key: {} (expected name or price)", args.sort_key);
    };
    let Some(sort_order) = SortOrder::parse(&args.sort_order) else {
        bail!("unknown sort order: {} (expected asc or desc)", args.sort_order);
    };
    Ok(ItemsQuery {
        page: args.page.max(1),
        limit: args.limit.filter(|limit| *limit > 0).unwrap_or(default_limit),
        search_term: args.query.trim().to_string(),
        sort_key,
        sort_order,
    })
}

fn run_server(args: &Args) -> Result<()> {
    let mut config = ServerConfig::from_env();
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(data) = &args.data {
        config.data_path = data.clone();
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(config))
}

fn run_cli(args: &Args) -> Result<()> {
    let data_path = args.data.clone().unwrap_or_else(data_path_from_env);
    let query = items_query(args, ClientConfig::from_env().page_limit)?;
    let entries = CatalogStore::open(data_path).read_all()?;
    let page = run_query(&entries, &query);
    for entry in &page.data {
        println!(
            "[{}] {} | {} | {}",
            entry.id,
            entry.name,
            format_price(entry.price),
            category_label(entry)
        );
    }
    println!(
        "Page {} of {} ({} results)",
        page.page,
        page.total_pages.max(1),
        page.total_results
    );
    Ok(())
}

fn run_gui(args: &Args) -> Result<()> {
    let mut config = ClientConfig::from_env();
    if let Some(api) = &args.api {
        config.api_url = api.trim_end_matches('/').to_string();
    }
    let limit = args
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(config.page_limit);
    let query = args.query.clone();
    let api = Arc::new(HttpCatalogApi::new(config.api_url));

    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport =
        eframe::egui::ViewportBuilder::default().with_inner_size(eframe::egui::vec2(960.0, 720.0));

    eframe::run_native(
        "Catalog Browser",
        native_options,
        Box::new(move |_cc| Ok(Box::new(CatalogBrowserApp::new(api, limit, query)))),
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();
    if args.serve {
        run_server(&args)
    } else if args.cli {
        run_cli(&args)
    } else {
        run_gui(&args)
    }
}
