use log::info;
use metriken::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::Filter;

const PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 100.0];

/// Start the HTTP admin server for metrics
pub async fn start_server(addr: SocketAddr) {
    info!("Starting metrics server on {}", addr);
    warp::serve(routes()).run(addr).await;
}

pub fn routes() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and_then(prometheus_metrics);
    let metrics_json = warp::path!("metrics.json")
        .and(warp::get())
        .and_then(json_metrics);
    let vars = warp::path!("vars").and(warp::get()).and_then(human_metrics);

    metrics.or(metrics_json).or(vars)
}

enum Kind {
    Counter,
    Gauge,
}

/// One exported value: a counter, a gauge, or one percentile of a histogram.
struct Reading {
    name: String,
    description: Option<String>,
    labels: Vec<(String, String)>,
    kind: Kind,
    percentile: Option<f64>,
    value: f64,
}

impl Reading {
    /// `name/label/...` key used by the JSON and human readable formats.
    fn key(&self) -> String {
        let mut key = self.name.clone();
        for (_, value) in &self.labels {
            key.push('/');
            key.push_str(value);
        }
        if let Some(percentile) = self.percentile {
            key.push_str(&format!("/p{}", percentile as u32));
        }
        key
    }
}

fn collect() -> Vec<Reading> {
    let mut readings = Vec::new();

    for metric in &metriken::metrics() {
        let name = metric.name().replace('/', "_");
        let description = metric.description().map(|d| d.to_string());
        let mut labels: Vec<(String, String)> = metric
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .filter(|(k, _)| k != "unit")
            .collect();
        labels.sort();

        match metric.value() {
            Some(Value::Counter(value)) => readings.push(Reading {
                name,
                description,
                labels,
                kind: Kind::Counter,
                percentile: None,
                value: value as f64,
            }),
            Some(Value::Gauge(value)) => readings.push(Reading {
                name,
                description,
                labels,
                kind: Kind::Gauge,
                percentile: None,
                value: value as f64,
            }),
            Some(Value::Other(other)) => {
                if let Some(histogram) = other.downcast_ref::<metriken::AtomicHistogram>()
                    && let Some(loaded) = histogram.load()
                    && let Ok(Some(values)) = loaded.percentiles(&PERCENTILES)
                {
                    for (percentile, bucket) in values.iter() {
                        readings.push(Reading {
                            name: name.clone(),
                            description: description.clone(),
                            labels: labels.clone(),
                            kind: Kind::Gauge,
                            percentile: Some(*percentile),
                            value: bucket.end() as f64,
                        });
                    }
                }
            }
            _ => continue,
        }
    }

    readings
}

fn prometheus_text(readings: &[Reading]) -> String {
    let mut lines = Vec::new();

    for reading in readings {
        let mut labels: Vec<String> = reading
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        if let Some(percentile) = reading.percentile {
            labels.push(format!("percentile=\"{}\"", percentile));
        }
        let series = if labels.is_empty() {
            reading.name.clone()
        } else {
            format!("{}{{{}}}", reading.name, labels.join(","))
        };
        let kind = match reading.kind {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
        };

        match &reading.description {
            Some(description) => lines.push(format!(
                "# TYPE {} {}\n# HELP {} {}\n{} {}",
                reading.name, kind, reading.name, description, series, reading.value
            )),
            None => lines.push(format!(
                "# TYPE {} {}\n{} {}",
                reading.name, kind, series, reading.value
            )),
        }
    }

    lines.sort();
    lines.join("\n") + "\n# EOF\n"
}

/// GET /metrics - Prometheus/OpenMetrics format
async fn prometheus_metrics() -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::with_header(
        prometheus_text(&collect()),
        "content-type",
        "text/plain; version=0.0.4; charset=utf-8",
    ))
}

/// GET /metrics.json
async fn json_metrics() -> Result<impl warp::Reply, Infallible> {
    let mut metrics = serde_json::Map::new();
    for reading in collect() {
        metrics.insert(reading.key(), serde_json::json!(reading.value));
    }
    Ok(warp::reply::json(&metrics))
}

/// GET /vars - Human readable format
async fn human_metrics() -> Result<impl warp::Reply, Infallible> {
    let mut lines: Vec<String> = collect()
        .iter()
        .map(|reading| format!("{}: {}", reading.key(), reading.value))
        .collect();
    lines.sort();

    Ok(warp::reply::with_header(
        lines.join("\n") + "\n",
        "content-type",
        "text/plain; charset=utf-8",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    fn reading(labels: &[(&str, &str)], percentile: Option<f64>) -> Reading {
        Reading {
            name: "samples".to_string(),
            description: Some("Samples".to_string()),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            kind: Kind::Counter,
            percentile,
            value: 3.0,
        }
    }

    #[test]
    fn test_keys_include_labels() {
        assert_eq!(reading(&[("status", "sent")], None).key(), "samples/sent");
        assert_eq!(reading(&[], Some(90.0)).key(), "samples/p90");
    }

    #[test]
    fn test_prometheus_series_are_labelled() {
        let text = prometheus_text(&[reading(&[("status", "success")], None)]);
        assert!(text.contains("samples{status=\"success\"} 3"));
        assert!(text.contains("# TYPE samples counter"));
        assert!(text.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn test_routes_respond() {
        drop(Metrics::start_request());

        for path in ["/metrics", "/metrics.json", "/vars"] {
            let response = warp::test::request()
                .method("GET")
                .path(path)
                .reply(&routes())
                .await;
            assert_eq!(response.status(), 200, "{}", path);
        }

        let response = warp::test::request()
            .method("GET")
            .path("/vars")
            .reply(&routes())
            .await;
        let body = String::from_utf8_lossy(response.body()).to_string();
        assert!(body.contains("samples/sent"));

        let missing = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&routes())
            .await;
        assert_eq!(missing.status(), 404);
    }
}
