use serde::{ Serialize, Deserialize };

#[derive(Deserialize, Debug, Default)]
pub struct ChatQuery {
    pub stream: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
}
