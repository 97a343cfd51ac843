use clap::Parser;
use lunch_bot::config::cli::Command;
use lunch_bot::utils::{logger, validation::Validate};
use lunch_bot::{AppConfig, CliConfig, DateResolver, LunchError, LunchTools, MenuStore, OrderClient, QueryEngine};
use std::sync::Arc;

fn exit_on_fatal(e: LunchError) -> ! {
    tracing::error!("❌ Startup failed: {}", e);
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting lunch-bot");

    // 載入配置
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            AppConfig::from_file(path).unwrap_or_else(|e| exit_on_fatal(e))
        }
        None => AppConfig::from_env().unwrap_or_else(|e| exit_on_fatal(e)),
    };
    if let Some(menu_file) = &cli.menu_file {
        config.menu.path = menu_file.clone();
    }
    if cli.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        exit_on_fatal(e);
    }

    // 菜單檔案壞掉是致命錯誤；只有訂單指令時允許沒有菜單
    let store = match MenuStore::load(&config.menu.path) {
        Ok(store) => store,
        Err(e) if cli.command.needs_ordering() && !std::path::Path::new(&config.menu.path).exists() => {
            tracing::warn!("⚠️ Menu file unavailable ({}), continuing with order tools only", e);
            MenuStore::default()
        }
        Err(e) => exit_on_fatal(e),
    };

    let resolver = DateResolver::new(config.dates.date_rules().unwrap_or_else(|e| exit_on_fatal(e)));

    let orders = if cli.command.needs_ordering() {
        let credentials = config.order.credentials().unwrap_or_else(|e| exit_on_fatal(e));
        let client = OrderClient::new(&config.order, credentials)?;
        Some(Arc::new(client))
    } else {
        None
    };

    let tools = LunchTools::new(QueryEngine::new(Arc::new(store)), resolver, orders);

    let output = match cli.command {
        Command::Menu { date } => tools.get_lunch_menu(&date),
        Command::Search { query } => tools.search_menu(&query),
        Command::List => tools.list_all_menus(),
        Command::Order {
            date,
            menu_type,
            quantity,
        } => tools.place_order(&date, &menu_type, quantity).await,
        Command::Cancel { date, menu_type } => tools.cancel_order(&date, &menu_type).await,
        Command::Status { range } => tools.get_order_status(&range).await,
    };

    println!("{}", output);
    Ok(())
}
