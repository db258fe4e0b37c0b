//! Telco customer churn extract.

use super::{DatasetKind, DatasetProfile};
use crate::analyze::AnalysisSpec;
use crate::core::{ColumnKind, ColumnSource, TableSchema};
use crate::extract::PayloadFormat;
use crate::transform::{BandTable, Bound, CodeTable, DatasetStep, FeatureEngine, FeatureRule};
use crate::validate::ValidationRules;

const NUMERIC_FIELDS: [&str; 4] = ["SeniorCitizen", "tenure", "MonthlyCharges", "TotalCharges"];

const TEXT_FIELDS: [&str; 17] = [
    "customerID",
    "gender",
    "Partner",
    "Dependents",
    "PhoneService",
    "MultipleLines",
    "InternetService",
    "OnlineSecurity",
    "OnlineBackup",
    "DeviceProtection",
    "TechSupport",
    "StreamingTV",
    "StreamingMovies",
    "Contract",
    "PaperlessBilling",
    "PaymentMethod",
    "Churn",
];

const TENURE_GROUPS: [&str; 4] = ["New", "Regular", "Loyal", "Champion"];
const CHARGE_GROUPS: [&str; 3] = ["Low", "Medium", "High"];

fn tenure_bands() -> BandTable {
    BandTable::right_closed(&[0.0, 12.0, 36.0, 60.0, f64::INFINITY], &TENURE_GROUPS)
}

fn charge_bands() -> BandTable {
    BandTable::new()
        .band(Bound::Unbounded, Bound::Exclusive(30.0), "Low")
        .band(Bound::Inclusive(30.0), Bound::Inclusive(70.0), "Medium")
        .band(Bound::Exclusive(70.0), Bound::Unbounded, "High")
}

fn contract_codes() -> CodeTable {
    CodeTable::new()
        .code("Month-to-month", 0)
        .code("One year", 1)
        .code("Two year", 2)
}

fn engine() -> FeatureEngine {
    FeatureEngine::new()
        .step(DatasetStep::ImputeMedian {
            metric: "TotalCharges".into(),
        })
        .rule(FeatureRule::Bucket {
            source: "tenure".into(),
            target: "tenure_group".into(),
            table: tenure_bands(),
        })
        .rule(FeatureRule::Bucket {
            source: "MonthlyCharges".into(),
            target: "monthlycharges_group".into(),
            table: charge_bands(),
        })
        .rule(FeatureRule::Code {
            source: "InternetService".into(),
            target: "has_internet_service".into(),
            table: CodeTable::new().code("DSL", 1).code("Fiber optic", 1).code("No", 0),
        })
        .rule(FeatureRule::Flag {
            source: "MultipleLines".into(),
            equals: "Yes".into(),
            target: "is_multi_line_user".into(),
        })
        .rule(FeatureRule::Code {
            source: "Contract".into(),
            target: "contract_type_code".into(),
            table: contract_codes(),
        })
}

fn schema() -> TableSchema {
    let schema = TableSchema::new(DatasetKind::Churn.default_table(), 1);
    let schema = TEXT_FIELDS.iter().fold(schema, |s, field| {
        s.column_from(field, ColumnKind::Text, ColumnSource::Field((*field).to_string()))
    });
    NUMERIC_FIELDS
        .iter()
        .fold(schema, |s, field| {
            let kind = if *field == "MonthlyCharges" || *field == "TotalCharges" {
                ColumnKind::Float
            } else {
                ColumnKind::Integer
            };
            s.column_from(field, kind, ColumnSource::Field((*field).to_string()))
        })
        .column("tenure_group", ColumnKind::Text)
        .column("monthlycharges_group", ColumnKind::Text)
        .column("has_internet_service", ColumnKind::Integer)
        .column("is_multi_line_user", ColumnKind::Integer)
        .column("contract_type_code", ColumnKind::Integer)
}

fn rules() -> ValidationRules {
    ValidationRules::new()
        .null_check("tenure")
        .null_check("monthlycharges")
        .null_check("totalcharges")
        .expect_categories("tenure_group", &TENURE_GROUPS)
        .expect_categories("monthlycharges_group", &CHARGE_GROUPS)
        .code_domain("contract_type_code", &contract_codes().codes())
}

pub(super) fn profile() -> DatasetProfile {
    DatasetProfile {
        kind: DatasetKind::Churn,
        payload: PayloadFormat::RecordArray {
            metrics: NUMERIC_FIELDS.iter().map(ToString::to_string).collect(),
        },
        engine: engine(),
        schema: schema(),
        rules: rules(),
        analysis: AnalysisSpec::new("contract"),
        staged_file: "churn_staged.csv".to_string(),
    }
}
