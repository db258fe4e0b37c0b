//! Sample payloads.

use serde_json::{json, Map, Value};

/// Metric names carried by [`hourly_payload`].
pub const POLLUTANT_METRICS: [&str; 7] = [
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "uv_index",
];

/// An hourly-series payload of `hours` readings starting at midnight.
///
/// Reading `h` carries `level + h` for every metric.
#[must_use]
pub fn hourly_payload(hours: usize, level: f64) -> Value {
    let times: Vec<Value> = (0..hours)
        .map(|h| Value::String(format!("2024-05-01T{h:02}:00")))
        .collect();
    let mut hourly = Map::new();
    hourly.insert("time".into(), Value::Array(times));
    for metric in POLLUTANT_METRICS {
        let values: Vec<Value> = (0..hours).map(|h| json!(level + h as f64)).collect();
        hourly.insert(metric.into(), Value::Array(values));
    }
    json!({ "latitude": 28.7, "longitude": 77.1, "hourly": hourly })
}

/// A small Telco churn extract: four customers, one with blank total charges.
#[must_use]
pub fn churn_csv() -> String {
    [
        "customerID,gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,MultipleLines,\
InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,StreamingTV,\
StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,TotalCharges,Churn",
        "0001-A,Female,0,Yes,No,1,No,No phone service,DSL,No,Yes,No,No,No,No,Month-to-month,Yes,Electronic check,29.85,29.85,No",
        "0002-B,Male,0,No,No,34,Yes,No,DSL,Yes,No,Yes,No,No,No,One year,No,Mailed check,56.95,1889.5,No",
        "0003-C,Male,1,No,No,45,Yes,Yes,Fiber optic,No,No,No,No,Yes,Yes,Two year,Yes,Bank transfer (automatic),99.65,,Yes",
        "0004-D,Female,0,Yes,Yes,0,Yes,No,No,No internet service,No internet service,No internet service,No internet service,No internet service,No internet service,Two year,No,Mailed check,20.25,,No",
    ]
    .join("\n")
        + "\n"
}
