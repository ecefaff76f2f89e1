pub mod anonymous_apex;
pub mod apex_rest;
pub mod apex_test;
pub mod code_coverage;
pub mod debug_logs;
pub mod deploy_metadata;
pub mod dml;
pub mod get_record;
pub mod recently_viewed;
pub mod setup_audit_trail;
pub mod soql;
pub mod describe;
pub mod create_metadata;
pub mod utils;

use crate::dispatcher::ToolHandler;
use std::sync::Arc;

/// All handlers, in registration order.
pub fn all() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(utils::SalesforceContextUtils),
        Arc::new(soql::ExecuteSoqlQuery),
        Arc::new(describe::DescribeObject),
        Arc::new(get_record::GetRecord),
        Arc::new(recently_viewed::GetRecentlyViewedRecords),
        Arc::new(setup_audit_trail::GetSetupAuditTrail),
        Arc::new(anonymous_apex::ExecuteAnonymousApex),
        Arc::new(dml::DmlOperation),
        Arc::new(deploy_metadata::DeployMetadata),
        Arc::new(create_metadata::CreateMetadata),
        Arc::new(apex_test::RunApexTest),
        Arc::new(code_coverage::GetApexClassCodeCoverage),
        Arc::new(debug_logs::ApexDebugLogs),
        Arc::new(apex_rest::InvokeApexRestResource),
    ]
}
