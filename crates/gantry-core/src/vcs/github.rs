//! GitHub REST implementation of the VCS gateway.
//!
//! Deliberately thin: one method per platform operation, no retries, no
//! caching. Errors carry the HTTP status and the action that failed.

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use url::Url;

use super::{CreatedPullRequest, NewPullRequest, PullRequest, VcsGateway};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "gantry/0.1.0";

pub struct GithubClient {
    http: Client,
    api_base: Url,
    token: String,
    repository: String,
}

impl GithubClient {
    pub fn new(token: impl Into<String>, repository: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_api_base(token, repository, DEFAULT_API_BASE)
    }

    /// Point the client at a non-default API host (GitHub Enterprise,
    /// test servers).
    pub fn with_api_base(
        token: impl Into<String>,
        repository: impl Into<String>,
        api_base: &str,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: Url::parse(api_base).context("Invalid API base URL")?,
            token: token.into(),
            repository: repository.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.as_str().trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    fn post(&self, path: &str, body: &Value) -> RequestBuilder {
        self.http
            .post(self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(body)
    }

    fn put(&self, path: &str, body: &Value) -> RequestBuilder {
        self.http
            .put(self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(body)
    }

    fn patch(&self, path: &str, body: &Value) -> RequestBuilder {
        self.http
            .patch(self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(body)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    fn check(response: Response, action: &str) -> anyhow::Result<Response> {
        if !response.status().is_success() {
            anyhow::bail!("{action}: HTTP {}", response.status());
        }
        Ok(response)
    }

    fn label_names(raw: &Value) -> Vec<String> {
        raw.as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|label| label["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl VcsGateway for GithubClient {
    fn find_merged_pr(&self, branch: &str, sha: &str) -> anyhow::Result<Option<PullRequest>> {
        let response = self
            .get(&format!("repos/{}/commits/{sha}/pulls", self.repository))
            .send()
            .context("Failed to look up pull requests for commit")?;
        if response.status() == StatusCode::NOT_FOUND
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
        {
            return Ok(None);
        }
        let prs: Vec<Value> = Self::check(response, "Failed to look up pull requests for commit")?
            .json()
            .context("Failed to parse pull request list")?;

        // Prefer the PR merged into the pushed branch; fall back to any
        // merged PR associated with the commit.
        let merged = prs
            .iter()
            .find(|pr| !pr["merged_at"].is_null() && pr["base"]["ref"] == branch)
            .or_else(|| prs.iter().find(|pr| !pr["merged_at"].is_null()));

        match merged.and_then(|pr| pr["number"].as_u64()) {
            Some(number) => Ok(Some(self.pull_request(number)?)),
            None => Ok(None),
        }
    }

    fn pull_request(&self, number: u64) -> anyhow::Result<PullRequest> {
        let pr: Value = Self::check(
            self.get(&format!("repos/{}/pulls/{number}", self.repository))
                .send()
                .context("Failed to get pull request")?,
            "Failed to get pull request",
        )?
        .json()
        .context("Failed to parse pull request")?;

        let files: Vec<Value> = Self::check(
            self.get(&format!(
                "repos/{}/pulls/{number}/files?per_page=100",
                self.repository
            ))
            .send()
            .context("Failed to get pull request files")?,
            "Failed to get pull request files",
        )?
        .json()
        .context("Failed to parse pull request files")?;

        Ok(PullRequest {
            number,
            title: pr["title"].as_str().unwrap_or_default().to_string(),
            source_branch: pr["head"]["ref"].as_str().unwrap_or_default().to_string(),
            head_sha: pr["head"]["sha"].as_str().unwrap_or_default().to_string(),
            labels: Self::label_names(&pr["labels"]),
            changed_files: files
                .iter()
                .filter_map(|file| file["filename"].as_str().map(str::to_string))
                .collect(),
        })
    }

    fn labels_for_pr(&self, number: u64) -> anyhow::Result<Vec<String>> {
        let labels: Value = Self::check(
            self.get(&format!(
                "repos/{}/issues/{number}/labels?per_page=100",
                self.repository
            ))
            .send()
            .context("Failed to get PR labels")?,
            "Failed to get PR labels",
        )?
        .json()
        .context("Failed to parse PR labels")?;
        Ok(Self::label_names(&labels))
    }

    fn ensure_label_exists(&self, name: &str) -> anyhow::Result<()> {
        let response = self
            .get(&format!("repos/{}/labels/{name}", self.repository))
            .send()
            .with_context(|| format!("Failed to ensure label exists {name}"))?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            anyhow::bail!(
                "Failed to ensure label exists {name}: HTTP {}",
                response.status()
            );
        }

        Self::check(
            self.post(
                &format!("repos/{}/labels", self.repository),
                &json!({
                    "name": name,
                    "color": label_color(name),
                    "description": "Auto-generated deployment label",
                }),
            )
            .send()
            .with_context(|| format!("Failed to create label {name}"))?,
            &format!("Failed to create label {name}"),
        )?;
        Ok(())
    }

    fn add_label(&self, number: u64, label: &str) -> anyhow::Result<()> {
        Self::check(
            self.post(
                &format!("repos/{}/issues/{number}/labels", self.repository),
                &json!({ "labels": [label] }),
            )
            .send()
            .with_context(|| format!("Failed to add label {label}"))?,
            &format!("Failed to add label {label}"),
        )?;
        Ok(())
    }

    fn remove_label(&self, number: u64, label: &str) -> anyhow::Result<()> {
        let response = self
            .delete(&format!(
                "repos/{}/issues/{number}/labels/{label}",
                self.repository
            ))
            .send()
            .with_context(|| format!("Failed to remove label {label}"))?;
        // Label not on the PR; nothing to remove.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response, &format!("Failed to remove label {label}"))?;
        Ok(())
    }

    fn upsert_tagged_comment(&self, number: u64, content: &str, tag: &str) -> anyhow::Result<()> {
        let marker = format!("<!-- {tag} -->");
        let comments: Vec<Value> = Self::check(
            self.get(&format!(
                "repos/{}/issues/{number}/comments?per_page=100",
                self.repository
            ))
            .send()
            .context("Failed to list PR comments")?,
            "Failed to list PR comments",
        )?
        .json()
        .context("Failed to parse PR comments")?;

        let body = json!({ "body": format!("{content}\n\n{marker}") });
        let existing = comments.iter().find(|comment| {
            comment["body"]
                .as_str()
                .is_some_and(|text| text.contains(&marker))
        });

        match existing.and_then(|comment| comment["id"].as_u64()) {
            Some(id) => {
                Self::check(
                    self.patch(
                        &format!("repos/{}/issues/comments/{id}", self.repository),
                        &body,
                    )
                    .send()
                    .context("Failed to update PR comment")?,
                    "Failed to update PR comment",
                )?;
            }
            None => {
                Self::check(
                    self.post(
                        &format!("repos/{}/issues/{number}/comments", self.repository),
                        &body,
                    )
                    .send()
                    .context("Failed to create PR comment")?,
                    "Failed to create PR comment",
                )?;
            }
        }
        Ok(())
    }

    fn write_repo_file(
        &self,
        repo: &str,
        branch: &str,
        base_branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> anyhow::Result<bool> {
        // Create the feature branch from the base branch when missing.
        let head = self
            .get(&format!("repos/{repo}/git/ref/heads/{branch}"))
            .send()
            .context("Failed to look up feature branch")?;
        if head.status() == StatusCode::NOT_FOUND {
            let base: Value = Self::check(
                self.get(&format!("repos/{repo}/git/ref/heads/{base_branch}"))
                    .send()
                    .context("Failed to look up base branch")?,
                "Failed to look up base branch",
            )?
            .json()
            .context("Failed to parse base branch ref")?;
            let base_sha = base["object"]["sha"]
                .as_str()
                .context("Base branch ref has no sha")?;
            Self::check(
                self.post(
                    &format!("repos/{repo}/git/refs"),
                    &json!({ "ref": format!("refs/heads/{branch}"), "sha": base_sha }),
                )
                .send()
                .context("Failed to create feature branch")?,
                "Failed to create feature branch",
            )?;
        } else {
            Self::check(head, "Failed to look up feature branch")?;
        }

        // Compare against what the branch already holds.
        let existing = self
            .get(&format!("repos/{repo}/contents/{path}?ref={branch}"))
            .send()
            .context("Failed to read existing manifest")?;
        let file_sha = if existing.status() == StatusCode::NOT_FOUND {
            None
        } else {
            let file: Value = Self::check(existing, "Failed to read existing manifest")?
                .json()
                .context("Failed to parse existing manifest")?;
            let encoded: String = file["content"]
                .as_str()
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if let Ok(bytes) = BASE64.decode(encoded)
                && bytes == content.as_bytes()
            {
                return Ok(false);
            }
            file["sha"].as_str().map(str::to_string)
        };

        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        if let Some(sha) = file_sha {
            body["sha"] = json!(sha);
        }
        Self::check(
            self.put(&format!("repos/{repo}/contents/{path}"), &body)
                .send()
                .context("Failed to update manifest file")?,
            "Failed to update manifest file",
        )?;
        Ok(true)
    }

    fn create_pull_request(&self, req: &NewPullRequest) -> anyhow::Result<CreatedPullRequest> {
        let pr: Value = Self::check(
            self.post(
                &format!("repos/{}/pulls", req.repo),
                &json!({
                    "title": req.title,
                    "head": req.head,
                    "base": req.base,
                    "body": req.body,
                }),
            )
            .send()
            .context("Failed to create pull request")?,
            "Failed to create pull request",
        )?
        .json()
        .context("Failed to parse created pull request")?;

        let number = pr["number"]
            .as_u64()
            .context("Created pull request has no number")?;
        let url = pr["html_url"]
            .as_str()
            .context("Created pull request has no URL")?
            .to_string();

        if !req.labels.is_empty() {
            Self::check(
                self.post(
                    &format!("repos/{}/issues/{number}/labels", req.repo),
                    &json!({ "labels": req.labels }),
                )
                .send()
                .context("Failed to label pull request")?,
                "Failed to label pull request",
            )?;
        }

        Ok(CreatedPullRequest { number, url })
    }

    fn enable_auto_merge(
        &self,
        repo: &str,
        number: u64,
        merge_method: &str,
    ) -> anyhow::Result<()> {
        // Auto-merge is GraphQL-only on GitHub.
        let pr: Value = Self::check(
            self.get(&format!("repos/{repo}/pulls/{number}"))
                .send()
                .context("Failed to get pull request node id")?,
            "Failed to get pull request node id",
        )?
        .json()
        .context("Failed to parse pull request")?;
        let node_id = pr["node_id"]
            .as_str()
            .context("Pull request has no node id")?;

        let mutation = "mutation($id: ID!, $method: PullRequestMergeMethod!) { \
             enablePullRequestAutoMerge(input: {pullRequestId: $id, mergeMethod: $method}) \
             { clientMutationId } }";
        let result: Value = Self::check(
            self.post(
                "graphql",
                &json!({
                    "query": mutation,
                    "variables": { "id": node_id, "method": merge_method.to_uppercase() },
                }),
            )
            .send()
            .context("Failed to enable auto-merge")?,
            "Failed to enable auto-merge",
        )?
        .json()
        .context("Failed to parse auto-merge response")?;

        if let Some(errors) = result["errors"].as_array()
            && !errors.is_empty()
        {
            anyhow::bail!("Failed to enable auto-merge: {}", errors[0]["message"]);
        }
        Ok(())
    }
}

// Labels hint at their environment; color-code them accordingly.
fn label_color(name: &str) -> &'static str {
    if name.contains("production") {
        "ff0000"
    } else if name.contains("staging") {
        "ffaa00"
    } else if name.contains("develop") {
        "00aa00"
    } else {
        "0052cc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_colors_follow_environment() {
        assert_eq!(label_color("environment:production"), "ff0000");
        assert_eq!(label_color("environment:staging"), "ffaa00");
        assert_eq!(label_color("environment:develop"), "00aa00");
        assert_eq!(label_color("deploy:order-service"), "0052cc");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = GithubClient::with_api_base("t", "acme/app", "http://127.0.0.1:9000/api/v3/")
            .unwrap();
        assert_eq!(
            client.endpoint("repos/acme/app/pulls/1"),
            "http://127.0.0.1:9000/api/v3/repos/acme/app/pulls/1"
        );
    }
}
