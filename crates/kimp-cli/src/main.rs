//! 김치 프리미엄 시세판 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 거래대금 순 실시간 시세판
//! kimp watch
//!
//! # 프리미엄 오름차순, "비트" 검색, 상위 20개
//! kimp watch --sort premium --asc --search 비트 --limit 20
//!
//! # 즐겨찾기 토글
//! kimp favorite KRW-BTC
//!
//! # Binance 심볼 매핑 확인
//! kimp map KRW-BTC KRW-BTT KRW-NU
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kimp_cli::commands::{favorite, map, watch};
use kimp_core::{AppConfig, SortColumn, SortDirection, SortState};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kimp")]
#[command(about = "Upbit / Binance 김치 프리미엄 실시간 시세판", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 실시간 시세판 실행 (Ctrl-C로 종료)
    Watch {
        /// 정렬 컬럼 (code, name, english, price, change, premium, gap, volume)
        #[arg(short, long, default_value = "volume")]
        sort: SortColumn,

        /// 오름차순 정렬 (기본: 내림차순)
        #[arg(long)]
        asc: bool,

        /// 검색어 (코드, 한글명, 영문명)
        #[arg(short = 'q', long, default_value = "")]
        search: String,

        /// 최대 표시 행 수 (0 = 전체)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// 설정 파일
        #[arg(short, long, default_value = "config/default.toml")]
        config: PathBuf,
    },

    /// 즐겨찾기 토글
    Favorite {
        /// 마켓 코드 (예: KRW-BTC)
        code: String,

        /// 설정 파일
        #[arg(short, long, default_value = "config/default.toml")]
        config: PathBuf,
    },

    /// Upbit 마켓 코드의 Binance 심볼 매핑 출력
    Map {
        /// 마켓 코드 (예: KRW-BTC KRW-BTT)
        #[arg(required = true)]
        codes: Vec<String>,

        /// 설정 파일
        #[arg(short, long, default_value = "config/default.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env 파일이 없어도 무시
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            sort,
            asc,
            search,
            limit,
            config,
        } => {
            let direction = if asc {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            };

            watch::run_watch(watch::WatchOptions {
                config_path: config,
                sort: SortState::new(sort, direction),
                search,
                limit,
            })
            .await?;
        }

        Commands::Favorite { code, config } => {
            let config = load_config(&config)?;
            let path = PathBuf::from(&config.view.favorites_path);
            let added = favorite::toggle_favorite(&path, &code)?;

            let action = if added { "추가" } else { "제거" };
            println!("{} 즐겨찾기 {} ({})", code.to_uppercase(), action, path.display());
        }

        Commands::Map { codes, config } => {
            let config = load_config(&config)?;
            map::print_mappings(&codes, config.binance.stream);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("설정을 읽을 수 없습니다: {}", path.display()))
}
