mod commands;
mod utils;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wanna_core::PushMode;

#[derive(Parser)]
#[command(name = "wanna")]
#[command(about = "Vertex AI のジョブとパイプラインを wanna.yaml からビルド・デプロイ・実行", long_about = None)]
struct Cli {
    /// wanna.yaml のパス（省略時は WANNA_FILE → カレントディレクトリを探索）
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,
    /// GCPプロファイル名（省略時は WANNA_GCP_PROFILE_NAME → default）
    #[arg(short, long, global = true)]
    profile: Option<String>,
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// カスタムジョブ
    #[command(subcommand)]
    Job(ReleaseCommands),
    /// Kubeflow パイプライン
    #[command(subcommand)]
    Pipeline(ReleaseCommands),
    /// Workbench ノートブック
    #[command(subcommand)]
    Notebook(NotebookCommands),
    /// Tensorboard インスタンス
    #[command(subcommand)]
    Tensorboard(TensorboardCommands),
    /// 設定を検証
    Validate,
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum ReleaseCommands {
    /// イメージをビルドしてマニフェストを作成
    Build(ReleaseArgs),
    /// ビルドしてイメージとマニフェストをプッシュ
    Push(ReleaseArgs),
    /// プッシュ済みのマニフェストをデプロイ
    Deploy(ReleaseArgs),
    /// プッシュ済みのマニフェストを実行
    Run {
        #[command(flatten)]
        args: ReleaseArgs,
        /// 完了まで待つ
        #[arg(long)]
        sync: bool,
    },
}

#[derive(Args, Clone)]
struct ReleaseArgs {
    /// 対象の名前（省略時または all で全て）
    #[arg(short = 'n', long)]
    name: Option<String>,
    /// リリースバージョン（省略時は wanna_project.version）
    #[arg(long)]
    version: Option<String>,
    /// プッシュ対象
    #[arg(long, value_enum, default_value_t = ModeArg::All)]
    mode: ModeArg,
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeArg {
    All,
    Containers,
    Manifests,
    Quick,
}

impl From<ModeArg> for PushMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => PushMode::All,
            ModeArg::Containers => PushMode::Containers,
            ModeArg::Manifests => PushMode::Manifests,
            ModeArg::Quick => PushMode::Quick,
        }
    }
}

#[derive(Args, Clone)]
struct FleetArgs {
    /// 対象の名前（省略時または all で全て）
    #[arg(short = 'n', long)]
    name: Option<String>,
    /// 確認なしで実行
    #[arg(short, long)]
    yes: bool,
    /// 差分の表示のみ
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum NotebookCommands {
    Create(FleetArgs),
    Delete(FleetArgs),
    /// 宣言と稼働中のインスタンスを揃える
    Sync(FleetArgs),
    /// 状態とURLを表示
    Report(FleetArgs),
}

#[derive(Subcommand)]
enum TensorboardCommands {
    Create(FleetArgs),
    Delete(FleetArgs),
    /// 宣言と稼働中のインスタンスを揃える
    Sync(FleetArgs),
    /// 一覧とURLを表示
    List(FleetArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("wanna {}", env!("CARGO_PKG_VERSION"));
        match wanna_config::get_config_dir() {
            Ok(dir) => println!("config: {}", dir.display()),
            Err(e) => tracing::debug!(error = %e, "User config directory unavailable"),
        }
        return Ok(());
    }

    let locate = utils::Locate {
        file: cli.file.clone(),
        profile: cli.profile.clone(),
    };

    if matches!(cli.command, Commands::Validate) {
        return commands::validate::handle(&locate);
    }

    let workspace = utils::Workspace::load(&locate)?;

    match cli.command {
        Commands::Job(cmd) => match cmd {
            ReleaseCommands::Build(args) => {
                commands::job::build(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Push(args) => {
                commands::job::push(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Deploy(args) => {
                commands::job::deploy(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Run { args, sync } => {
                commands::job::run(&workspace, &args.into_options(), sync).await?;
            }
        },
        Commands::Pipeline(cmd) => match cmd {
            ReleaseCommands::Build(args) => {
                commands::pipeline::build(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Push(args) => {
                commands::pipeline::push(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Deploy(args) => {
                commands::pipeline::deploy(&workspace, &args.into_options()).await?;
            }
            ReleaseCommands::Run { args, sync } => {
                commands::pipeline::run(&workspace, &args.into_options(), sync).await?;
            }
        },
        Commands::Notebook(cmd) => match cmd {
            NotebookCommands::Create(args) => {
                commands::notebook::create(&workspace, &args.into_options()).await?;
            }
            NotebookCommands::Delete(args) => {
                commands::notebook::delete(&workspace, &args.into_options()).await?;
            }
            NotebookCommands::Sync(args) => {
                commands::notebook::sync(&workspace, &args.into_options()).await?;
            }
            NotebookCommands::Report(args) => {
                commands::notebook::report(&workspace, &args.into_options()).await?;
            }
        },
        Commands::Tensorboard(cmd) => match cmd {
            TensorboardCommands::Create(args) => {
                commands::tensorboard::create(&workspace, &args.into_options()).await?;
            }
            TensorboardCommands::Delete(args) => {
                commands::tensorboard::delete(&workspace, &args.into_options()).await?;
            }
            TensorboardCommands::Sync(args) => {
                commands::tensorboard::sync(&workspace, &args.into_options()).await?;
            }
            TensorboardCommands::List(args) => {
                commands::tensorboard::list(&workspace, &args.into_options()).await?;
            }
        },
        Commands::Validate | Commands::Version => {}
    }

    Ok(())
}

impl ReleaseArgs {
    fn into_options(self) -> commands::ReleaseOptions {
        commands::ReleaseOptions {
            name: self.name,
            version: self.version,
            mode: self.mode.into(),
        }
    }
}

impl FleetArgs {
    fn into_options(self) -> commands::FleetOptions {
        commands::FleetOptions {
            name: self.name,
            yes: self.yes,
            dry_run: self.dry_run,
        }
    }
}
