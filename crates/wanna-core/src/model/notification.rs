use serde::{Deserialize, Serialize};

/// wanna.yaml の `notification_channels` 要素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannelConfig {
    pub name: String,
    #[serde(flatten)]
    pub channel: ChannelType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelType {
    Email { emails: Vec<String> },
    Pubsub { topics: Vec<String> },
}

impl ChannelType {
    /// Cloud Monitoring のチャネル種別
    pub fn monitoring_type(&self) -> &'static str {
        match self {
            ChannelType::Email { .. } => "email",
            ChannelType::Pubsub { .. } => "pubsub",
        }
    }

    /// 宛先一覧（メールアドレスまたはトピック）
    pub fn targets(&self) -> &[String] {
        match self {
            ChannelType::Email { emails } => emails,
            ChannelType::Pubsub { topics } => topics,
        }
    }
}
