use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "wanna.yaml が見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: wanna.yaml, wanna.yml, .wanna.yaml\n\
        - ./.wanna/ ディレクトリ\n\
        または WANNA_FILE 環境変数で直接指定できます"
    )]
    WannaFileNotFound,

    #[error("WANNA_FILE で指定されたファイルが存在しません: {0}")]
    ExplicitFileMissing(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
