use crate::error::BackendError;
use crate::models::HealthReport;
use crate::services::BackendConfig;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 后端 HTTP 接口：心跳与关闭
#[derive(Clone)]
pub struct HealthClient {
    client: reqwest::Client,
    health_url: String,
    shutdown_url: String,
    health_timeout: Duration,
    shutdown_timeout: Duration,
}

impl HealthClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().no_proxy().build()?;

        Ok(Self {
            client,
            health_url: config.health_url(),
            shutdown_url: config.shutdown_url(),
            health_timeout: config.health_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// 心跳检测，任何失败都折叠为 `connected: false`，不会返回错误
    pub async fn check(&self) -> HealthReport {
        let response = match self
            .client
            .get(&self.health_url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return HealthReport::unreachable(describe(&e, self.health_timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            return HealthReport::unreachable(format!("HTTP {}", status.as_u16()));
        }

        match response.text().await {
            // 响应体原样转发，不是 JSON 时按字符串处理
            Ok(body) => {
                let data = serde_json::from_str(&body).unwrap_or(Value::String(body));
                HealthReport::healthy(data)
            }
            Err(e) => HealthReport::unreachable(describe(&e, self.health_timeout)),
        }
    }

    /// 请求后端自行退出；成功只代表后端已收到请求
    pub async fn request_shutdown(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .post(&self.shutdown_url)
            .json(&serde_json::json!({}))
            .timeout(self.shutdown_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::ShutdownRejected(status.as_u16()))
        }
    }
}

fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("Health check timed out after {}ms", timeout.as_millis())
    } else if err.is_connect() {
        "Backend connection refused".to_string()
    } else {
        err.to_string()
    }
}

/// 周期性心跳任务，丢弃或调用 `cancel` 时停止
pub struct HealthPoller {
    task: JoinHandle<()>,
}

impl HealthPoller {
    pub fn spawn<F>(client: HealthClient, every: Duration, on_report: F) -> Self
    where
        F: Fn(HealthReport) + Send + Sync + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = client.check().await;
                if let Some(error) = &report.error {
                    tracing::debug!("[Health] 后端不可用: {}", error);
                }
                on_report(report);
            }
        });

        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_ms: u64) -> HealthClient {
        let address = server.address();
        let config = BackendConfig {
            host: address.ip().to_string(),
            port: address.port(),
            health_timeout_ms: timeout_ms,
            shutdown_timeout_ms: timeout_ms,
            ..BackendConfig::default()
        };
        HealthClient::new(&config).unwrap()
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn healthy_backend_forwards_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "status": "ok", "timestamp": 1.5 })),
            )
            .mount(&server)
            .await;

        let report = client_for(&server, 2000).check().await;
        assert!(report.connected);
        assert!(report.error.is_none());
        assert_eq!(report.data.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn non_success_status_is_disconnected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let report = client_for(&server, 2000).check().await;
        assert!(!report.connected);
        assert_eq!(report.error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn slow_backend_times_out_without_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let report = client_for(&server, 200).check().await;
        assert!(!report.connected);
        assert!(report.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_disconnected() {
        let config = BackendConfig {
            port: unused_port(),
            ..BackendConfig::default()
        };
        let report = HealthClient::new(&config).unwrap().check().await;
        assert!(!report.connected);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn shutdown_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shutdown"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, 2000).request_shutdown().await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn rejected_shutdown_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shutdown"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client_for(&server, 2000).request_shutdown().await;
        assert!(matches!(result, Err(BackendError::ShutdownRejected(500))));
    }

    #[tokio::test]
    async fn poller_reports_until_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let poller = HealthPoller::spawn(
            client_for(&server, 2000),
            Duration::from_millis(50),
            move |report| sink.lock().unwrap().push(report),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        poller.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(poller.is_finished());

        let count = reports.lock().unwrap().len();
        assert!(count >= 2);
        assert!(reports.lock().unwrap().iter().all(|r| r.connected));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(reports.lock().unwrap().len(), count);
    }
}
