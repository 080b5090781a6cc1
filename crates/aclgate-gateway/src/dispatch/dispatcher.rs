use aclgate_core::error::Result;
use aclgate_core::protocol::admin::{AdminRequest, AdminResponse};

use crate::app_state::AppState;
use crate::transport::codec::error_response;

/// Routes administrative requests to the owning app.
///
/// Handling is synchronous and may block on persistence or the policy
/// reload; async callers run it on the blocking pool.
#[derive(Clone)]
pub struct AdminDispatcher {
    state: AppState,
}

impl AdminDispatcher {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn handle(&self, req: AdminRequest) -> AdminResponse {
        let op = req.op();
        let resp = self.route(req).unwrap_or_else(|e| {
            tracing::warn!(op, error = %e, "admin request failed");
            error_response(&e)
        });

        let code = resp.code();
        self.state
            .metrics()
            .admin_requests
            .inc(&[("op", op), ("code", code.as_str())]);
        tracing::debug!(op, code = code.as_str(), "admin request handled");
        resp
    }

    fn route(&self, req: AdminRequest) -> Result<AdminResponse> {
        let st = &self.state;
        let sup = st.supervisor();

        Ok(match req {
            AdminRequest::CreateAcl {
                app_id,
                status,
                acl,
            } => AdminResponse::AclWrite(sup.app(&app_id)?.create_acl(st, status, acl)?),
            AdminRequest::UpdateAcl {
                app_id,
                acl_id,
                acl,
            } => AdminResponse::AclWrite(sup.app(&app_id)?.update_acl(st, &acl_id, acl)?),
            AdminRequest::UpdateAclStatus {
                app_id,
                acl_id,
                status,
            } => AdminResponse::Status {
                code: sup.app(&app_id)?.update_acl_status(st, &acl_id, status)?,
            },
            AdminRequest::UpdateAclMetadata {
                app_id,
                acl_id,
                metadata,
            } => AdminResponse::Status {
                code: sup.app(&app_id)?.update_acl_metadata(st, &acl_id, &metadata)?,
            },
            AdminRequest::UpdateAclCustomMetadata {
                app_id,
                acl_id,
                custom_metadata,
            } => AdminResponse::Status {
                code: sup
                    .app(&app_id)?
                    .update_acl_custom_metadata(st, &acl_id, custom_metadata)?,
            },
            AdminRequest::DeleteAcl { app_id, acl_id } => AdminResponse::Status {
                code: sup.app(&app_id)?.delete_acl(st, &acl_id)?,
            },
            AdminRequest::GetAcl { app_id, acl_id } => {
                AdminResponse::Acl(sup.app(&app_id)?.get_acl(st, &acl_id)?)
            }
            AdminRequest::ListAcls { app_id } => AdminResponse::Acls {
                acls: sup.app(&app_id)?.list_acls()?,
            },
            AdminRequest::GetAppStatus { app_id } => {
                AdminResponse::AppStatus(sup.app(&app_id)?.status()?)
            }
            AdminRequest::ListApps => AdminResponse::Apps {
                apps: sup
                    .apps()
                    .iter()
                    .map(|a| a.summary())
                    .collect::<Result<Vec<_>>>()?,
            },
            AdminRequest::GetManifestRules { app_id } => {
                AdminResponse::ManifestRules(sup.app(&app_id)?.manifest_rules()?)
            }
            AdminRequest::RestartApp { app_id } => AdminResponse::Status {
                code: sup.app(&app_id)?.restart(st)?,
            },
            AdminRequest::Metrics => AdminResponse::Metrics {
                text: st.metrics().render(),
            },
        })
    }
}
