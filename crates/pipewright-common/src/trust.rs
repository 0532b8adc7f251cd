//! IAM trust policy documents.
//!
//! Statements read from the identity store are kept as raw JSON text and
//! written back byte for byte. Statements pipewright appends are typed.
//! Top-level keys pipewright does not model are carried through in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};

use crate::{Error, Result};

/// Policy language version written on documents built from scratch
pub const POLICY_VERSION: &str = "2012-10-17";

/// Namespace of the EBS CSI controller service account
pub const EBS_CSI_NAMESPACE: &str = "kube-system";
/// Service account name of the EBS CSI controller
pub const EBS_CSI_SERVICE_ACCOUNT: &str = "ebs-csi-controller-sa";

/// A role's trust policy: who may assume it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustDocument {
    /// Policy language version
    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Ordered statements; only ever appended to
    #[serde(rename = "Statement")]
    pub statements: Vec<StatementEntry>,
    /// Unmodelled top-level keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a document's statement list
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatementEntry {
    /// Read from the identity store; serialized verbatim
    Existing(Box<RawValue>),
    /// Appended by pipewright
    Appended(Statement),
}

impl StatementEntry {
    /// Typed view of the entry
    pub fn statement(&self) -> serde_json::Result<Statement> {
        match self {
            Self::Existing(raw) => serde_json::from_str(raw.get()),
            Self::Appended(statement) => Ok(statement.clone()),
        }
    }
}

impl PartialEq for StatementEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Existing(a), Self::Existing(b)) => a.get() == b.get(),
            (Self::Appended(a), Self::Appended(b)) => a == b,
            _ => false,
        }
    }
}

/// Fields read without buffering so the statement text stays intact
#[derive(Deserialize)]
struct RawDocument<'a> {
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "Statement", default, borrow)]
    statement: Option<&'a RawValue>,
}

/// A single trust statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Optional statement id
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// `Allow` or `Deny`
    #[serde(rename = "Effect")]
    pub effect: String,
    /// Principal block (object or `"*"`)
    #[serde(rename = "Principal", default, skip_serializing_if = "Value::is_null")]
    pub principal: Value,
    /// Action or list of actions
    #[serde(rename = "Action", default, skip_serializing_if = "Value::is_null")]
    pub action: Value,
    /// Condition block
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    /// Unmodelled statement keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Statement {
    /// Allow `principal_arn` to assume the role
    pub fn assume_role(principal_arn: &str) -> Self {
        Self {
            sid: None,
            effect: "Allow".to_string(),
            principal: json!({ "AWS": principal_arn }),
            action: json!("sts:AssumeRole"),
            condition: None,
            extra: Map::new(),
        }
    }

    /// Allow a cluster service account to assume the role through the
    /// cluster's OIDC provider
    pub fn web_identity(
        account: &str,
        region: &str,
        oidc_id: &str,
        namespace: &str,
        service_account: &str,
    ) -> Self {
        let issuer_host = format!("oidc.eks.{}.amazonaws.com/id/{}", region, oidc_id);

        let mut string_equals = Map::new();
        string_equals.insert(format!("{}:aud", issuer_host), json!("sts.amazonaws.com"));
        string_equals.insert(
            format!("{}:sub", issuer_host),
            json!(format!("system:serviceaccount:{}:{}", namespace, service_account)),
        );

        Self {
            sid: None,
            effect: "Allow".to_string(),
            principal: json!({
                "Federated": format!("arn:aws:iam::{}:oidc-provider/{}", account, issuer_host)
            }),
            action: json!("sts:AssumeRoleWithWebIdentity"),
            condition: Some(json!({ "StringEquals": string_equals })),
            extra: Map::new(),
        }
    }
}

impl TrustDocument {
    /// Empty document at the current policy version
    pub fn new() -> Self {
        Self {
            version: Some(POLICY_VERSION.to_string()),
            statements: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Decode a document as returned by the identity store. URL-encoded text
    /// is decoded once; text that is already a JSON object is parsed as is.
    pub fn parse_encoded(role: &str, raw: &str) -> Result<Self> {
        if raw.trim_start().starts_with('{') {
            return Self::parse(role, raw);
        }
        let decoded = urlencoding::decode(raw)
            .map_err(|e| Error::policy(role, format!("failed to URL-decode: {}", e)))?;
        Self::parse(role, &decoded)
    }

    /// Parse a plain JSON document, keeping each statement's text
    pub fn parse(role: &str, json: &str) -> Result<Self> {
        let malformed =
            |e: serde_json::Error| Error::policy(role, format!("failed to parse: {}", e));

        let raw: RawDocument<'_> = serde_json::from_str(json).map_err(malformed)?;
        let mut extra: Map<String, Value> = serde_json::from_str(json).map_err(malformed)?;
        extra.shift_remove("Version");
        extra.shift_remove("Statement");

        let statements = match raw.statement {
            None => Vec::new(),
            // a lone statement object is allowed in place of a list
            Some(value) if value.get().starts_with('{') => vec![value.to_owned()],
            Some(value) => serde_json::from_str::<Vec<&RawValue>>(value.get())
                .map_err(malformed)?
                .into_iter()
                .map(RawValue::to_owned)
                .collect(),
        };

        Ok(Self {
            version: raw.version,
            statements: statements.into_iter().map(StatementEntry::Existing).collect(),
            extra,
        })
    }

    /// Serialize for writing back to the identity store
    pub fn to_json(&self, role: &str) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::policy(role, format!("failed to serialize: {}", e)))
    }

    /// Append a statement after the existing ones. Existing statements are
    /// never touched, and no deduplication happens: appending the same
    /// statement twice yields two entries.
    pub fn append_statement(&mut self, statement: Statement) {
        self.statements.push(StatementEntry::Appended(statement));
    }
}

impl Default for TrustDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider id of an OIDC issuer URL (its last path segment)
pub fn oidc_provider_id(issuer: &str) -> &str {
    issuer.trim_end_matches('/').rsplit('/').next().unwrap_or(issuer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EXISTING: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"eks.amazonaws.com"},"Action":"sts:AssumeRole"},{"Sid":"Admins","Effect":"Allow","Principal":{"AWS":"arn:aws:iam::123456789012:root"},"Action":["sts:AssumeRole","sts:TagSession"],"Custom":true}]}"#;

    #[test]
    fn decodes_url_encoded_documents() {
        let encoded = urlencoding::encode(EXISTING);
        let doc = TrustDocument::parse_encoded("role", &encoded).unwrap();
        assert_eq!(doc.version.as_deref(), Some("2012-10-17"));
        assert_eq!(doc.statements.len(), 2);
        let admins = doc.statements[1].statement().unwrap();
        assert_eq!(admins.sid.as_deref(), Some("Admins"));
        assert_eq!(admins.extra.get("Custom"), Some(&json!(true)));
    }

    #[test]
    fn append_keeps_existing_statements_intact() {
        let mut doc = TrustDocument::parse_encoded("role", EXISTING).unwrap();
        let before = doc.statements.clone();

        doc.append_statement(Statement::assume_role(
            "arn:aws:iam::123456789012:role/BuildAdminRole02",
        ));

        assert_eq!(doc.statements.len(), before.len() + 1);
        assert_eq!(&doc.statements[..before.len()], &before[..]);

        let written = doc.to_json("role").unwrap();
        let reread: Value = serde_json::from_str(&written).unwrap();
        let original: Value = serde_json::from_str(EXISTING).unwrap();
        let statements = reread["Statement"].as_array().unwrap();
        assert_eq!(&statements[..2], original["Statement"].as_array().unwrap().as_slice());
        assert_eq!(
            statements[2],
            json!({
                "Effect": "Allow",
                "Principal": {"AWS": "arn:aws:iam::123456789012:role/BuildAdminRole02"},
                "Action": "sts:AssumeRole"
            })
        );
    }

    #[test]
    fn existing_statements_are_written_back_byte_for_byte() {
        let first = r#"{"Effect":"Allow","Action":"sts:AssumeRole","Principal":{"Service":"eks.amazonaws.com","AWS":"arn:aws:iam::123456789012:root"}}"#;
        let second = r#"{ "Action" : [ "sts:TagSession" ], "Effect" : "Allow", "Principal" : { "AWS" : "*" }, "Condition" : { "NumericLessThan" : { "aws:MultiFactorAuthAge" : 3.60e3 } } }"#;
        let document = format!(
            r#"{{"Statement":[{}, {}],"Version":"2012-10-17","Zeta":1,"Alpha":2}}"#,
            first, second
        );

        let mut doc = TrustDocument::parse_encoded("role", &document).unwrap();
        doc.append_statement(Statement::assume_role("arn:b"));
        let written = doc.to_json("role").unwrap();

        assert!(written.contains(first), "{}", written);
        assert!(written.contains(second), "{}", written);
        assert!(written.find(first).unwrap() < written.find(second).unwrap());
        assert!(written.find("\"Zeta\"").unwrap() < written.find("\"Alpha\"").unwrap());
    }

    #[test]
    fn plain_json_is_not_url_decoded() {
        let document = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":"*"},"Action":"sts:AssumeRole","Condition":{"StringLike":{"aws:userid":"a%41b"}}}]}"#;

        let doc = TrustDocument::parse_encoded("role", document).unwrap();
        let condition = doc.statements[0].statement().unwrap().condition.unwrap();
        assert_eq!(condition["StringLike"]["aws:userid"], "a%41b");
        assert!(doc.to_json("role").unwrap().contains("a%41b"));
    }

    #[test]
    fn encoded_text_is_decoded_exactly_once() {
        let document = r#"{"Statement":[{"Effect":"Allow","Principal":{"AWS":"*"},"Action":"sts:AssumeRole","Condition":{"StringLike":{"aws:userid":"a%41b"}}}]}"#;
        let encoded = urlencoding::encode(document);

        let doc = TrustDocument::parse_encoded("role", &encoded).unwrap();
        let condition = doc.statements[0].statement().unwrap().condition.unwrap();
        assert_eq!(condition["StringLike"]["aws:userid"], "a%41b");
    }

    #[test]
    fn single_statement_object_is_accepted() {
        let doc = TrustDocument::parse_encoded(
            "role",
            r#"{"Statement":{"Effect":"Allow","Principal":"*","Action":"sts:AssumeRole"}}"#,
        )
        .unwrap();
        assert_eq!(doc.version, None);
        assert_eq!(doc.statements.len(), 1);
        assert_eq!(doc.statements[0].statement().unwrap().principal, json!("*"));
    }

    #[test]
    fn appending_twice_duplicates() {
        let mut doc = TrustDocument::new();
        doc.append_statement(Statement::assume_role("arn:a"));
        doc.append_statement(Statement::assume_role("arn:a"));
        assert_eq!(doc.statements.len(), 2);
        assert_eq!(doc.statements[0], doc.statements[1]);
    }

    #[rstest]
    #[case::encoded_garbage("%7Bnot-json")]
    #[case::plain_garbage("{not-json")]
    #[case::statement_not_a_list(r#"{"Statement":"nope"}"#)]
    fn malformed_documents_are_policy_errors(#[case] raw: &str) {
        let err = TrustDocument::parse_encoded("demo02AdminRole", raw).unwrap_err();
        assert!(matches!(err, Error::Policy { ref role, .. } if role == "demo02AdminRole"));
    }

    #[test]
    fn web_identity_statement_scopes_to_service_account() {
        let statement = Statement::web_identity(
            "123456789012",
            "eu-central-1",
            "ABCDEF",
            EBS_CSI_NAMESPACE,
            EBS_CSI_SERVICE_ACCOUNT,
        );
        assert_eq!(
            statement.principal["Federated"],
            "arn:aws:iam::123456789012:oidc-provider/oidc.eks.eu-central-1.amazonaws.com/id/ABCDEF"
        );
        let conditions = &statement.condition.unwrap()["StringEquals"];
        assert_eq!(
            conditions["oidc.eks.eu-central-1.amazonaws.com/id/ABCDEF:aud"],
            "sts.amazonaws.com"
        );
        assert_eq!(
            conditions["oidc.eks.eu-central-1.amazonaws.com/id/ABCDEF:sub"],
            "system:serviceaccount:kube-system:ebs-csi-controller-sa"
        );
    }

    #[rstest]
    #[case("https://oidc.eks.eu-central-1.amazonaws.com/id/ABCDEF", "ABCDEF")]
    #[case("https://issuer/id/XYZ/", "XYZ")]
    #[case("bare", "bare")]
    fn provider_id_is_last_issuer_segment(#[case] issuer: &str, #[case] expected: &str) {
        assert_eq!(oidc_provider_id(issuer), expected);
    }
}
