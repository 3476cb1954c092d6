use core::fmt;
use core::time::Duration;

use async_trait::async_trait;
use jira_intents::{IssueKey, Transition, parse_issue_key};
use plugin_core::truncate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::JiraConfig;
use crate::tracker::{Issue, NewIssue, Tracker, TrackerError, User};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ISSUE_FIELDS: [&str; 5] = ["summary", "status", "assignee", "priority", "issuetype"];

/// A logged-in session against the Jira REST API (v2).
#[derive(Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl fmt::Debug for JiraClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawIssue {
    key: String,
    fields: RawFields,
}

#[derive(Deserialize)]
struct RawFields {
    #[serde(default)]
    summary: String,
    status: Option<Named>,
    assignee: Option<RawUser>,
    priority: Option<Named>,
    issuetype: Option<Named>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        let RawFields {
            summary,
            status,
            assignee,
            priority,
            issuetype,
        } = raw.fields;
        Self {
            key: raw.key,
            summary,
            status: status.map_or_else(|| "Unknown".to_owned(), |s| s.name),
            assignee: assignee.and_then(|u| u.display_name.or(u.name)),
            priority: priority.map(|p| p.name),
            issue_type: issuetype.map(|t| t.name),
        }
    }
}

impl RawUser {
    fn into_user(self) -> Option<User> {
        let name = self.name.or(self.account_id)?;
        let display_name = self.display_name.unwrap_or_else(|| name.clone());
        Some(User { name, display_name })
    }
}

impl JiraClient {
    /// Opens a session: OAuth when configured, otherwise (or when OAuth is not
    /// usable) basic auth.
    pub async fn login(config: &JiraConfig) -> Result<Self, TrackerError> {
        if let Some(client) = Self::login_oauth(config) {
            return Ok(client);
        }
        Self::login_basic(config).await
    }

    fn login_oauth(config: &JiraConfig) -> Option<Self> {
        if !config.has_oauth() {
            debug!("oauth configuration not set");
            return None;
        }
        // OAuth 1.0a request signing needs the consumer's RSA key; sessions
        // here only speak basic auth.
        warn!(
            api_url = %config.api_url,
            key_file = ?config.oauth_key_cert_file,
            "OAuth credentials configured but OAuth signing is unavailable, falling back to basic auth"
        );
        None
    }

    async fn login_basic(config: &JiraConfig) -> Result<Self, TrackerError> {
        let client = Self::new(config)?;
        client
            .request_json::<serde_json::Value>(client.http.get(client.url("myself")), "myself")
            .await
            .map_err(|e| {
                TrackerError::Login(format!(
                    "Unable to login to {} via basic auth: {e}",
                    config.api_url
                ))
            })?;
        info!(api_url = %config.api_url, "logging into Jira via basic auth");
        Ok(client)
    }

    fn new(config: &JiraConfig) -> Result<Self, TrackerError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, TrackerError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        debug!(status = status.as_u16(), what, "Jira response");
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound(what.to_owned()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }
        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, TrackerError> {
        Ok(self.send(request, what).await?.json::<T>().await?)
    }
}

#[async_trait]
impl Tracker for JiraClient {
    async fn fetch_issue(&self, key: &IssueKey) -> Result<Issue, TrackerError> {
        let request = self
            .http
            .get(self.url(&format!("issue/{key}")))
            .query(&[("fields", ISSUE_FIELDS.join(","))]);
        let raw: RawIssue = self.request_json(request, &format!("Issue {key}")).await?;
        Ok(raw.into())
    }

    async fn list_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>, TrackerError> {
        #[derive(Deserialize)]
        struct RawTransitions {
            transitions: Vec<RawTransition>,
        }
        #[derive(Deserialize)]
        struct RawTransition {
            id: String,
            name: String,
        }

        let request = self.http.get(self.url(&format!("issue/{key}/transitions")));
        let raw: RawTransitions = self.request_json(request, &format!("Issue {key}")).await?;
        Ok(raw
            .transitions
            .into_iter()
            .map(|t| Transition::new(t.id, t.name))
            .collect())
    }

    async fn apply_transition(
        &self,
        key: &IssueKey,
        transition_id: &str,
    ) -> Result<(), TrackerError> {
        let request = self
            .http
            .post(self.url(&format!("issue/{key}/transitions")))
            .json(&json!({ "transition": { "id": transition_id } }));
        self.send(request, &format!("Issue {key}")).await?;
        Ok(())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueKey, TrackerError> {
        #[derive(Deserialize)]
        struct Created {
            key: String,
        }

        let mut fields = json!({
            "project": { "key": issue.project },
            "summary": issue.summary,
            "issuetype": { "name": issue.issue_type },
        });
        if let Some(priority) = &issue.priority {
            fields["priority"] = json!({ "name": priority });
        }
        let request = self
            .http
            .post(self.url("issue"))
            .json(&json!({ "fields": fields }));
        let created: Created = self
            .request_json(request, &format!("Project {}", issue.project))
            .await?;
        parse_issue_key(&created.key).map_err(|_| {
            TrackerError::UnexpectedResponse(format!("created issue key {}", created.key))
        })
    }

    async fn assign_issue(&self, key: &IssueKey, username: &str) -> Result<(), TrackerError> {
        let request = self
            .http
            .put(self.url(&format!("issue/{key}/assignee")))
            .json(&json!({ "name": username }));
        self.send(request, &format!("Issue {key}")).await?;
        Ok(())
    }

    async fn find_assignable_users(
        &self,
        query: &str,
        project: &str,
    ) -> Result<Vec<User>, TrackerError> {
        let request = self
            .http
            .get(self.url("user/assignable/multiProjectSearch"))
            .query(&[("username", query), ("projectKeys", project)]);
        let raw: Vec<RawUser> = self
            .request_json(request, &format!("Project {project}"))
            .await?;
        Ok(raw.into_iter().filter_map(RawUser::into_user).collect())
    }

    async fn run_query(&self, jql: &str, limit: u32) -> Result<Vec<Issue>, TrackerError> {
        #[derive(Deserialize)]
        struct SearchResults {
            #[serde(default)]
            issues: Vec<RawIssue>,
        }

        debug!(jql, limit, "Running Jira search");
        let request = self.http.post(self.url("search")).json(&json!({
            "jql": jql,
            "maxResults": limit,
            "fields": ISSUE_FIELDS,
        }));
        let results: SearchResults = self.request_json(request, "Search").await?;
        Ok(results.issues.into_iter().map(Issue::from).collect())
    }

    fn permalink(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JiraConfig {
        serde_yaml::from_str(
            "API_URL: https://jira.example.com/\nUSERNAME: bot\nPASSWORD: pw\nPROJECT: FOO\n",
        )
        .unwrap()
    }

    #[test]
    fn urls_drop_trailing_slash() {
        let client = JiraClient::new(&config()).unwrap();
        assert_eq!(
            client.url("issue/FOO-1"),
            "https://jira.example.com/rest/api/2/issue/FOO-1"
        );
        assert_eq!(client.permalink("FOO-1"), "https://jira.example.com/browse/FOO-1");
    }

    #[test]
    fn raw_issue_maps_nested_names() {
        let raw: RawIssue = serde_json::from_value(json!({
            "key": "FOO-1",
            "fields": {
                "summary": "Login fails",
                "status": { "name": "Open" },
                "assignee": { "name": "ada", "displayName": "Ada Lovelace" },
                "priority": { "name": "Major" },
                "issuetype": { "name": "Bug" }
            }
        }))
        .unwrap();
        let issue = Issue::from(raw);
        assert_eq!(issue.key, "FOO-1");
        assert_eq!(issue.status, "Open");
        assert_eq!(issue.assignee.as_deref(), Some("Ada Lovelace"));
        assert_eq!(issue.priority.as_deref(), Some("Major"));
        assert_eq!(issue.issue_type.as_deref(), Some("Bug"));
    }

    #[test]
    fn unassigned_issue_has_no_assignee() {
        let raw: RawIssue = serde_json::from_value(json!({
            "key": "FOO-2",
            "fields": { "summary": "x", "status": { "name": "Done" }, "assignee": null }
        }))
        .unwrap();
        let issue = Issue::from(raw);
        assert_eq!(issue.assignee, None);
        assert_eq!(issue.priority, None);
    }

    #[test]
    fn users_fall_back_to_account_id() {
        let raw: Vec<RawUser> = serde_json::from_value(json!([
            { "accountId": "5b10", "displayName": "Ada" },
            { "name": "bob" },
            { "displayName": "nobody" }
        ]))
        .unwrap();
        let users: Vec<User> = raw.into_iter().filter_map(RawUser::into_user).collect();
        assert_eq!(
            users,
            vec![
                User {
                    name: "5b10".to_owned(),
                    display_name: "Ada".to_owned()
                },
                User {
                    name: "bob".to_owned(),
                    display_name: "bob".to_owned()
                },
            ]
        );
    }
}
