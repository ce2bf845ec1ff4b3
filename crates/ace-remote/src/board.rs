//! Project Board Adapter (§4.2): queries and mutations against the
//! source-control service's Projects v2 GraphQL API plus its issue-tracking
//! REST API, using [`crate::client::RemoteClient`] underneath.
//!
//! Grounded on `original_source/src/ace/github/projects_v2.py` and
//! `status_manager.py` for the exact query/mutation shapes (paginated
//! `organization(login:).projectsV2`, the `ProjectV2SingleSelectField`
//! named `"Status"`, and paginated `project.items`).

use std::collections::HashMap;

use ace_core::model::{BlockerEdge, BoardItem, ContentType};
use serde_json::{json, Value};
use thiserror::Error;

use crate::client::{RemoteClient, RemoteError};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("unexpected graphql response shape: {0}")]
    UnexpectedShape(String),
}

/// The located "Status" single-select field and its option name -> id map.
#[derive(Debug, Clone)]
pub struct StatusField {
    pub field_id: String,
    pub options: HashMap<String, String>,
}

pub struct ProjectBoardAdapter<'a> {
    client: &'a RemoteClient,
}

impl<'a> ProjectBoardAdapter<'a> {
    pub fn new(client: &'a RemoteClient) -> Self {
        ProjectBoardAdapter { client }
    }

    /// Paginate `organization(login:).projectsV2`, matching by title.
    pub async fn find_project_id(&self, org: &str, project_name: &str) -> Result<Option<String>, BoardError> {
        let mut cursor: Option<String> = None;
        loop {
            let query = r#"
                query($org: String!, $cursor: String) {
                  organization(login: $org) {
                    projectsV2(first: 50, after: $cursor) {
                      nodes { id title }
                      pageInfo { hasNextPage endCursor }
                    }
                  }
                }
            "#;
            let variables = json!({ "org": org, "cursor": cursor });
            let response = self.client.graphql(query, variables).await?;

            let page = response
                .pointer("/data/organization/projectsV2")
                .ok_or_else(|| BoardError::UnexpectedShape("missing projectsV2".to_string()))?;

            let nodes = page.get("nodes").and_then(|n| n.as_array()).cloned().unwrap_or_default();
            for node in &nodes {
                if node.get("title").and_then(|t| t.as_str()) == Some(project_name) {
                    let id = node.get("id").and_then(|i| i.as_str()).map(|s| s.to_string());
                    return Ok(id);
                }
            }

            let page_info = page.get("pageInfo");
            let has_next = page_info.and_then(|p| p.get("hasNextPage")).and_then(|v| v.as_bool()).unwrap_or(false);
            if !has_next {
                return Ok(None);
            }
            cursor = page_info.and_then(|p| p.get("endCursor")).and_then(|v| v.as_str()).map(|s| s.to_string());
        }
    }

    /// Locate the "Status" single-select field on a project.
    pub async fn get_status_field(&self, project_id: &str) -> Result<StatusField, BoardError> {
        let query = r#"
            query($id: ID!) {
              node(id: $id) {
                ... on ProjectV2 {
                  fields(first: 50) {
                    nodes {
                      ... on ProjectV2SingleSelectField {
                        id
                        name
                        options { id name }
                      }
                    }
                  }
                }
              }
            }
        "#;
        let response = self.client.graphql(query, json!({ "id": project_id })).await?;
        let nodes = response
            .pointer("/data/node/fields/nodes")
            .and_then(|v| v.as_array())
            .ok_or_else(|| BoardError::UnexpectedShape("missing fields".to_string()))?;

        for node in nodes {
            if node.get("name").and_then(|n| n.as_str()) == Some("Status") {
                return parse_status_field(node);
            }
        }
        Err(BoardError::UnexpectedShape("no Status field found".to_string()))
    }

    /// Paginate project items, yielding only those whose `Status` field
    /// equals `status_name`; items with no content (archived/draft) are
    /// skipped.
    pub async fn list_items_by_status(
        &self,
        project_id: &str,
        status_name: &str,
    ) -> Result<Vec<BoardItem>, BoardError> {
        let mut cursor: Option<String> = None;
        let mut out = Vec::new();

        loop {
            let query = r#"
                query($id: ID!, $cursor: String) {
                  node(id: $id) {
                    ... on ProjectV2 {
                      items(first: 50, after: $cursor) {
                        nodes {
                          id
                          fieldValueByName(name: "Status") {
                            ... on ProjectV2ItemFieldSingleSelectValue { name }
                          }
                          content {
                            __typename
                            ... on Issue { id number title url labels(first: 20) { nodes { name } } repository { owner { login } name } }
                            ... on PullRequest { id number title url labels(first: 20) { nodes { name } } repository { owner { login } name } }
                          }
                        }
                        pageInfo { hasNextPage endCursor }
                      }
                    }
                  }
                }
            "#;
            let variables = json!({ "id": project_id, "cursor": cursor });
            let response = self.client.graphql(query, variables).await?;

            let items = response
                .pointer("/data/node/items")
                .ok_or_else(|| BoardError::UnexpectedShape("missing items".to_string()))?;

            let nodes = items.get("nodes").and_then(|v| v.as_array()).cloned().unwrap_or_default();
            for node in &nodes {
                if let Some(board_item) = parse_board_item(node, status_name) {
                    out.push(board_item);
                }
            }

            let page_info = items.get("pageInfo");
            let has_next = page_info.and_then(|p| p.get("hasNextPage")).and_then(|v| v.as_bool()).unwrap_or(false);
            if !has_next {
                return Ok(out);
            }
            cursor = page_info.and_then(|p| p.get("endCursor")).and_then(|v| v.as_str()).map(|s| s.to_string());
        }
    }

    pub async fn find_item_id_for_issue(
        &self,
        project_id: &str,
        repo_owner: &str,
        repo_name: &str,
        number: u64,
    ) -> Result<Option<String>, BoardError> {
        // The projects API has no direct "find by issue" query; scan all
        // items (unfiltered by status) and match on repo+number, mirroring
        // the prior implementation's approach in `projects_v2.py`.
        let query = r#"
            query($id: ID!, $cursor: String) {
              node(id: $id) {
                ... on ProjectV2 {
                  items(first: 100, after: $cursor) {
                    nodes {
                      id
                      content {
                        ... on Issue { number repository { owner { login } name } }
                        ... on PullRequest { number repository { owner { login } name } }
                      }
                    }
                    pageInfo { hasNextPage endCursor }
                  }
                }
              }
            }
        "#;
        let mut cursor: Option<String> = None;
        loop {
            let response = self.client.graphql(query, json!({ "id": project_id, "cursor": cursor })).await?;
            let items = response
                .pointer("/data/node/items")
                .ok_or_else(|| BoardError::UnexpectedShape("missing items".to_string()))?;
            let nodes = items.get("nodes").and_then(|v| v.as_array()).cloned().unwrap_or_default();
            for node in &nodes {
                let content = node.get("content");
                let matches = content
                    .and_then(|c| c.get("number"))
                    .and_then(|n| n.as_u64())
                    == Some(number)
                    && content
                        .and_then(|c| c.pointer("/repository/owner/login"))
                        .and_then(|v| v.as_str())
                        == Some(repo_owner)
                    && content.and_then(|c| c.pointer("/repository/name")).and_then(|v| v.as_str())
                        == Some(repo_name);
                if matches {
                    return Ok(node.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()));
                }
            }
            let page_info = items.get("pageInfo");
            let has_next = page_info.and_then(|p| p.get("hasNextPage")).and_then(|v| v.as_bool()).unwrap_or(false);
            if !has_next {
                return Ok(None);
            }
            cursor = page_info.and_then(|p| p.get("endCursor")).and_then(|v| v.as_str()).map(|s| s.to_string());
        }
    }

    pub async fn update_item_status(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<(), BoardError> {
        let mutation = r#"
            mutation($project: ID!, $item: ID!, $field: ID!, $option: String!) {
              updateProjectV2ItemFieldValue(input: {
                projectId: $project, itemId: $item, fieldId: $field,
                value: { singleSelectOptionId: $option }
              }) { projectV2Item { id } }
            }
        "#;
        let variables = json!({
            "project": project_id, "item": item_id, "field": field_id, "option": option_id,
        });
        self.client.graphql(mutation, variables).await?;
        Ok(())
    }

    /// Read the "tracked-in" relationship for an issue's blockers.
    /// Non-fatal on failure: returns an empty list and logs, per §4.2.
    pub async fn get_issue_blockers(
        &self,
        repo_owner: &str,
        repo_name: &str,
        number: u64,
    ) -> Vec<BlockerEdge> {
        let query = r#"
            query($owner: String!, $repo: String!, $number: Int!) {
              repository(owner: $owner, name: $repo) {
                issue(number: $number) {
                  trackedInIssues(first: 50) {
                    nodes { id number title url repository { owner { login } name } }
                  }
                }
              }
            }
        "#;
        let variables = json!({ "owner": repo_owner, "repo": repo_name, "number": number });

        match self.client.graphql(query, variables).await {
            Ok(response) => parse_blockers(&response),
            Err(e) => {
                tracing::warn!(repo_owner, repo_name, number, error = %e, "failed to fetch issue blockers, treating as unblocked");
                Vec::new()
            }
        }
    }

    /// Resolve a single issue/PR's project status by number, used by the
    /// blocker-resolution path to check a blocker's current status.
    pub async fn get_issue_project_status(
        &self,
        project_id: &str,
        number: u64,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<Option<String>, BoardError> {
        let item_id = self.find_item_id_for_issue(project_id, repo_owner, repo_name, number).await?;
        let Some(item_id) = item_id else { return Ok(None) };

        let query = r#"
            query($id: ID!) {
              node(id: $id) {
                ... on ProjectV2Item {
                  fieldValueByName(name: "Status") {
                    ... on ProjectV2ItemFieldSingleSelectValue { name }
                  }
                }
              }
            }
        "#;
        let response = self.client.graphql(query, json!({ "id": item_id })).await?;
        Ok(response
            .pointer("/data/node/fieldValueByName/name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

fn parse_status_field(node: &Value) -> Result<StatusField, BoardError> {
    let field_id = node
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BoardError::UnexpectedShape("status field missing id".to_string()))?
        .to_string();

    let mut options = HashMap::new();
    if let Some(opts) = node.get("options").and_then(|v| v.as_array()) {
        for opt in opts {
            if let (Some(name), Some(id)) = (
                opt.get("name").and_then(|v| v.as_str()),
                opt.get("id").and_then(|v| v.as_str()),
            ) {
                options.insert(name.to_string(), id.to_string());
            }
        }
    }

    Ok(StatusField { field_id, options })
}

fn parse_board_item(node: &Value, expected_status: &str) -> Option<BoardItem> {
    let status = node.pointer("/fieldValueByName/name").and_then(|v| v.as_str());
    if status != Some(expected_status) {
        return None;
    }

    let content = node.get("content")?;
    if content.is_null() {
        // Archived or draft item with no content; skip per §4.2.
        return None;
    }

    let labels = content
        .pointer("/labels/nodes")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|l| l.get("name").and_then(|n| n.as_str()).map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(BoardItem {
        item_id: node.get("id")?.as_str()?.to_string(),
        content_id: content.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        content_type: match content.get("__typename").and_then(|v| v.as_str()) {
            Some("PullRequest") => ContentType::Pr,
            _ => ContentType::Issue,
        },
        title: content.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        number: content.get("number").and_then(|v| v.as_u64())?,
        repo_owner: content.pointer("/repository/owner/login").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        repo_name: content.pointer("/repository/name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        status: status.map(|s| s.to_string()),
        labels,
        html_url: content.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
    })
}

fn parse_blockers(response: &Value) -> Vec<BlockerEdge> {
    let nodes = response
        .pointer("/data/repository/issue/trackedInIssues/nodes")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    nodes
        .iter()
        .filter_map(|n| {
            Some(BoardItem {
                item_id: String::new(),
                content_id: n.get("id")?.as_str()?.to_string(),
                content_type: ContentType::Issue,
                title: n.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                number: n.get("number").and_then(|v| v.as_u64())?,
                repo_owner: n.pointer("/repository/owner/login").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                repo_name: n.pointer("/repository/name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                status: None,
                labels: Vec::new(),
                html_url: n.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            })
        })
        .map(|to| BlockerEdge {
            from: BoardItem {
                item_id: String::new(),
                content_id: String::new(),
                content_type: ContentType::Issue,
                title: String::new(),
                number: 0,
                repo_owner: String::new(),
                repo_name: String::new(),
                status: None,
                labels: Vec::new(),
                html_url: String::new(),
            },
            to,
        })
        .collect()
}
