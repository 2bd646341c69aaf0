//! Caller identity.
//!
//! Authentication happens in front of this server. The proxy that did it
//! forwards the resolved user and team in two headers, and every API
//! handler takes an [`Identity`] extracted from them.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use strata_core::{CoreError, Project, TeamId, UserId};

use crate::error::{ServerError, ServerResult};

pub const USER_HEADER: &str = "x-strata-user";
pub const TEAM_HEADER: &str = "x-strata-team";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user: UserId,
    pub team: TeamId,
}

impl Identity {
    pub fn new(user: UserId, team: TeamId) -> Self {
        Self { user, team }
    }

    /// Projects are visible only to their owning team.
    pub fn authorize(&self, project: &Project) -> ServerResult<()> {
        if project.team_id != self.team {
            return Err(CoreError::Forbidden(format!(
                "project {} is not owned by team {}",
                project.id, self.team
            ))
            .into());
        }
        Ok(())
    }

    pub fn authorize_team(&self, team: &TeamId) -> ServerResult<()> {
        if *team != self.team {
            return Err(CoreError::Forbidden(format!("not a member of team {team}")).into());
        }
        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> ServerResult<&'a str> {
    headers
        .get(name)
        .ok_or(ServerError::MissingIdentity(name))?
        .to_str()
        .map_err(|e| ServerError::InvalidIdentity {
            header: name,
            reason: e.to_string(),
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let invalid = |header: &'static str| {
            move |e: strata_core::TypeError| ServerError::InvalidIdentity {
                header,
                reason: e.to_string(),
            }
        };
        let user = UserId::new(header(&parts.headers, USER_HEADER)?).map_err(invalid(USER_HEADER))?;
        let team = TeamId::new(header(&parts.headers, TEAM_HEADER)?).map_err(invalid(TEAM_HEADER))?;
        Ok(Self { user, team })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use strata_core::ProjectId;

    use super::*;

    async fn extract(headers: &[(&str, &str)]) -> ServerResult<Identity> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn both_headers_resolve() {
        let id = extract(&[(USER_HEADER, "alice"), (TEAM_HEADER, "design")])
            .await
            .unwrap();
        assert_eq!(id.user.as_str(), "alice");
        assert_eq!(id.team.as_str(), "design");
    }

    #[tokio::test]
    async fn missing_team_is_rejected() {
        let err = extract(&[(USER_HEADER, "alice")]).await.unwrap_err();
        assert!(matches!(err, ServerError::MissingIdentity(TEAM_HEADER)));
    }

    #[tokio::test]
    async fn blank_user_is_rejected() {
        let err = extract(&[(USER_HEADER, ""), (TEAM_HEADER, "design")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidIdentity {
                header: USER_HEADER,
                ..
            }
        ));
    }

    #[test]
    fn foreign_projects_are_forbidden() {
        let id = Identity::new(UserId::new("alice").unwrap(), TeamId::new("design").unwrap());
        let project = Project {
            id: ProjectId::new(),
            team_id: TeamId::new("audio").unwrap(),
            name: "p1".into(),
            default_branch: strata_core::BranchId::new(),
            storage_grant: None,
            created_at: chrono::Utc::now(),
            deleting_at: None,
        };
        assert_eq!(
            id.authorize(&project).unwrap_err().status(),
            axum::http::StatusCode::FORBIDDEN
        );
    }
}
