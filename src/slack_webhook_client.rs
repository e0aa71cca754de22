use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::info;

use crate::alert_message::{AlertMessage, MAX_LISTED_GUARDRAILS};
use crate::error::WebhookError;
use crate::findings::NonCompliantItem;
use crate::retry::RetryPolicy;

const ITEM_SEPARATOR_WIDTH: usize = 50;
const NEXT_STEPS: &str = "💡 *Next Steps:* Review the non-compliant resources and take corrective action according to your organization's policies.";

#[async_trait]
pub trait Notify {
    async fn notify(&self, message: &AlertMessage) -> Result<(), WebhookError>;
}

pub struct SlackWebhookClient {
    client: Client,
    url: Url,
    retry: RetryPolicy,
}

#[async_trait]
impl Notify for SlackWebhookClient {
    async fn notify(&self, message: &AlertMessage) -> Result<(), WebhookError> {
        let payload = SlackMessage::from(message);
        self.retry
            .run("slack_webhook", WebhookError::is_retryable, || self.post(&payload))
            .await?;
        info!(total = message.total, "sent compliance alert to Slack");
        Ok(())
    }
}

impl SlackWebhookClient {
    pub fn new(url: Url, retry: RetryPolicy, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(client, url, retry))
    }

    fn new_with_client(client: Client, url: Url, retry: RetryPolicy) -> Self {
        SlackWebhookClient { client, url, retry }
    }

    async fn post(&self, payload: &SlackMessage) -> Result<(), WebhookError> {
        let response = self.client.post(self.url.clone()).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(WebhookError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Slack Block Kit payload.
#[derive(Debug, Serialize, PartialEq)]
pub struct SlackMessage {
    pub text: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<Text>>,
    },
    Divider,
    Context {
        elements: Vec<Text>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Text {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl Text {
    fn plain(text: impl Into<String>) -> Self {
        Text {
            kind: "plain_text",
            text: text.into(),
        }
    }

    fn markdown(text: impl Into<String>) -> Self {
        Text {
            kind: "mrkdwn",
            text: text.into(),
        }
    }
}

impl From<&AlertMessage> for SlackMessage {
    fn from(message: &AlertMessage) -> Self {
        let mut blocks = vec![
            Block::Header {
                text: Text::plain("🚨 AWS Guardrails Compliance Report"),
            },
            Block::Section {
                text: None,
                fields: Some(vec![
                    Text::markdown(format!(
                        "*📊 Total Issues:*\n{} non-compliant items",
                        message.total
                    )),
                    Text::markdown(format!("*📅 Report Date:*\n{}", message.report_date)),
                    Text::markdown(format!("*📁 Source File:*\n`{}`", message.source_file)),
                    Text::markdown(format!(
                        "*⏰ Alert Time:*\n{}",
                        message.alert_time.format("%Y-%m-%d %H:%M:%S UTC")
                    )),
                ]),
            },
            Block::Divider,
            Block::Section {
                text: Some(Text::markdown(guardrails_text(message))),
                fields: None,
            },
            Block::Divider,
        ];

        for (index, item) in message.details.iter().enumerate() {
            if index > 0 {
                blocks.push(Block::Context {
                    elements: vec![Text::markdown("─".repeat(ITEM_SEPARATOR_WIDTH))],
                });
            }
            blocks.push(item_block(item));
        }

        if message.remaining > 0 {
            blocks.push(Block::Context {
                elements: vec![Text::markdown(format!(
                    "📋 *{} additional non-compliant items not shown above*",
                    message.remaining
                ))],
            });
        }

        blocks.push(Block::Divider);
        blocks.push(Block::Context {
            elements: vec![Text::markdown(NEXT_STEPS)],
        });

        SlackMessage {
            text: format!(
                "🚨 AWS Guardrails Compliance Report - {} Non-Compliant Items Found",
                message.total
            ),
            blocks,
        }
    }
}

fn guardrails_text(message: &AlertMessage) -> String {
    let mut text = format!("*🎯 Affected Guardrails ({}):*\n", message.guardrails.len());
    for summary in message.guardrails.iter().take(MAX_LISTED_GUARDRAILS) {
        text.push_str(&format!("• `{}` ({} issues)\n", summary.guardrail, summary.count));
    }
    if message.guardrails.len() > MAX_LISTED_GUARDRAILS {
        text.push_str(&format!(
            "• ...and {} more guardrails\n",
            message.guardrails.len() - MAX_LISTED_GUARDRAILS
        ));
    }
    text
}

fn item_block(item: &NonCompliantItem) -> Block {
    let mut fields = vec![
        Text::markdown(format!("*Account:* `{}`", item.account_id)),
        Text::markdown(if item.guardrail.is_empty() {
            format!("*Control:* `{}`", item.control_name)
        } else {
            format!(
                "*Control:* `{}`\n*Guardrail:* `{}`",
                item.control_name, item.guardrail
            )
        }),
    ];

    let mut resource = Vec::new();
    if !item.resource_type.is_empty() {
        resource.push(format!("*Type:* `{}`", item.resource_type));
    }
    if !item.resource_arn.is_empty() {
        resource.push(format!("*ARN:* `{}`", item.resource_arn));
    }
    if !resource.is_empty() {
        fields.push(Text::markdown(resource.join("\n")));
    }

    Block::Section {
        text: None,
        fields: Some(fields),
    }
}

#[cfg(test)]
mod tests {
    use crate::alert_message::{AlertMessage, GuardrailSummary};
    use crate::error::WebhookError;
    use crate::findings::NonCompliantItem;
    use crate::retry::RetryPolicy;
    use crate::slack_webhook_client::{Block, Notify, SlackMessage, SlackWebhookClient};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use reqwest::Url;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn item(index: usize) -> NonCompliantItem {
        NonCompliantItem {
            account_id: "111122223333".to_string(),
            guardrail: "CT.S3.PR.1-Block public access".to_string(),
            control_name: "S3 buckets should block public access".to_string(),
            resource_type: "AWS::S3::Bucket".to_string(),
            resource_arn: format!("arn:aws:s3:::bucket-{}", index),
        }
    }

    fn message(details: usize, remaining: usize, guardrails: usize) -> AlertMessage {
        AlertMessage {
            total: details + remaining,
            report_date: "2024-05-03".to_string(),
            source_file: "guardrails_2024-05-03.csv".to_string(),
            alert_time: Utc.with_ymd_and_hms(2024, 5, 3, 9, 30, 0).unwrap(),
            guardrails: (0..guardrails)
                .map(|i| GuardrailSummary {
                    guardrail: format!("CT.G.PR.{}-Guardrail", i),
                    count: 1,
                })
                .collect(),
            details: (0..details).map(item).collect(),
            remaining,
        }
    }

    async fn serve(status: StatusCode) -> (Url, Arc<AtomicU32>, Arc<Mutex<Vec<serde_json::Value>>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let (counter, received) = (calls.clone(), bodies.clone());
        let app = Router::new().route(
            "/services/T000/B000/XXXX",
            post(move |Json(body): Json<serde_json::Value>| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                received.lock().unwrap().push(body);
                status
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = Url::parse(&format!("http://{}/services/T000/B000/XXXX", address)).unwrap();
        (url, calls, bodies)
    }

    fn webhook(url: Url) -> SlackWebhookClient {
        SlackWebhookClient::new(
            url,
            RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_payload_layout() {
        let payload = serde_json::to_value(SlackMessage::from(&message(2, 0, 2))).unwrap();

        assert_eq!(
            payload["text"],
            "🚨 AWS Guardrails Compliance Report - 2 Non-Compliant Items Found"
        );
        assert_eq!(payload["blocks"][0]["type"], "header");
        assert_eq!(payload["blocks"][0]["text"]["type"], "plain_text");
        assert_eq!(
            payload["blocks"][1]["fields"][0]["text"],
            "*📊 Total Issues:*\n2 non-compliant items"
        );
        assert_eq!(payload["blocks"][1]["fields"][1]["text"], "*📅 Report Date:*\n2024-05-03");
        assert_eq!(
            payload["blocks"][1]["fields"][2]["text"],
            "*📁 Source File:*\n`guardrails_2024-05-03.csv`"
        );
        assert_eq!(
            payload["blocks"][1]["fields"][3]["text"],
            "*⏰ Alert Time:*\n2024-05-03 09:30:00 UTC"
        );
        assert_eq!(payload["blocks"][2], serde_json::json!({"type": "divider"}));
        assert!(payload["blocks"][1].get("text").is_none());
    }

    #[test]
    fn test_payload_details_and_separators() {
        let payload = SlackMessage::from(&message(3, 0, 1));

        let sections: Vec<&Block> = payload
            .blocks
            .iter()
            .filter(|block| matches!(block, Block::Section { fields: Some(fields), .. } if fields.len() == 3))
            .collect();
        let separators = payload
            .blocks
            .iter()
            .filter(|block| match block {
                Block::Context { elements } => elements[0].text.starts_with('─'),
                _ => false,
            })
            .count();

        assert_eq!(sections.len(), 3);
        assert_eq!(separators, 2);

        let json = serde_json::to_value(sections[0]).unwrap();
        assert_eq!(json["fields"][0]["text"], "*Account:* `111122223333`");
        assert_eq!(
            json["fields"][1]["text"],
            "*Control:* `S3 buckets should block public access`\n*Guardrail:* `CT.S3.PR.1-Block public access`"
        );
        assert_eq!(
            json["fields"][2]["text"],
            "*Type:* `AWS::S3::Bucket`\n*ARN:* `arn:aws:s3:::bucket-0`"
        );
    }

    #[test]
    fn test_payload_notes_remaining_items() {
        let payload = serde_json::to_string(&SlackMessage::from(&message(8, 5, 1))).unwrap();
        assert!(payload.contains("📋 *5 additional non-compliant items not shown above*"));

        let complete = serde_json::to_string(&SlackMessage::from(&message(8, 0, 1))).unwrap();
        assert!(!complete.contains("additional non-compliant items"));
    }

    #[test]
    fn test_payload_lists_at_most_five_guardrails() {
        let payload = serde_json::to_value(SlackMessage::from(&message(1, 0, 7))).unwrap();
        let text = payload["blocks"][3]["text"]["text"].as_str().unwrap();

        assert!(text.starts_with("*🎯 Affected Guardrails (7):*\n"));
        assert!(text.contains("• `CT.G.PR.4-Guardrail` (1 issues)"));
        assert!(!text.contains("CT.G.PR.5-Guardrail"));
        assert!(text.contains("• ...and 2 more guardrails"));
    }

    #[tokio::test]
    async fn test_notify() {
        let (url, calls, bodies) = serve(StatusCode::OK).await;

        let result = webhook(url).notify(&message(1, 0, 1)).await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let bodies = bodies.lock().unwrap();
        assert_eq!(
            bodies[0]["text"],
            "🚨 AWS Guardrails Compliance Report - 1 Non-Compliant Items Found"
        );
    }

    #[tokio::test]
    async fn test_notify_retries_server_errors() {
        let (url, calls, _) = serve(StatusCode::INTERNAL_SERVER_ERROR).await;

        let result = webhook(url).notify(&message(1, 0, 1)).await;

        assert!(matches!(result, Err(WebhookError::Status { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_notify_does_not_retry_client_errors() {
        let (url, calls, _) = serve(StatusCode::BAD_REQUEST).await;

        let result = webhook(url).notify(&message(1, 0, 1)).await;

        assert!(matches!(result, Err(WebhookError::Status { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
