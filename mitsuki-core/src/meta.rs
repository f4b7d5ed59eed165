//! Read-only route metadata, the boundary consumed by OpenAPI generators
//! and other documentation tooling.
//!
//! The view is built from the frozen route table and guaranteed stable
//! after startup.

use serde::{Deserialize, Serialize};

use crate::web::binding::BindingKind;
use crate::web::route::{RouteDescriptor, RouteTable};

/// Metadata about a single route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub controller: String,
    pub operation_id: String,
    pub params: Vec<ParamInfo>,
    pub request_body_type: Option<String>,
    pub response_type: Option<String>,
    pub excluded_fields: Vec<String>,
    pub security_tags: Vec<String>,
    pub summary: Option<String>,
    pub tag: Option<String>,
}

/// Metadata about one handler parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub location: ParamLocation,
    pub param_type: String,
    pub required: bool,
}

/// Where a parameter is located in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
    Request,
    MultipartFile,
    MultipartField,
}

impl From<BindingKind> for ParamLocation {
    fn from(kind: BindingKind) -> Self {
        match kind {
            BindingKind::Path => ParamLocation::Path,
            BindingKind::Query => ParamLocation::Query,
            BindingKind::Body => ParamLocation::Body,
            BindingKind::Request => ParamLocation::Request,
            BindingKind::MultipartFile => ParamLocation::MultipartFile,
            BindingKind::MultipartField => ParamLocation::MultipartField,
        }
    }
}

impl RouteInfo {
    pub fn from_route(route: &RouteDescriptor) -> Self {
        RouteInfo {
            method: route.method.as_str().to_string(),
            path: route.path_pattern.clone(),
            controller: route.controller.clone(),
            operation_id: route.handler_name.clone(),
            params: route
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    location: p.kind.into(),
                    param_type: p.type_name.to_string(),
                    required: p.required,
                })
                .collect(),
            request_body_type: route.ingress.as_ref().map(|s| s.type_name.to_string()),
            response_type: route.egress.as_ref().map(|s| s.type_name.to_string()),
            excluded_fields: route.egress_exclusions.iter().cloned().collect(),
            security_tags: route.security_tags.clone(),
            summary: route.summary.clone(),
            tag: route.tag.clone(),
        }
    }

    /// The identity triple used by consumers to compare route sets:
    /// method, path pattern, and parameter shapes.
    pub fn shape(&self) -> (String, String, Vec<ParamInfo>) {
        (self.method.clone(), self.path.clone(), self.params.clone())
    }
}

/// Build the full metadata view for a route table.
pub fn openapi_view(table: &RouteTable) -> Vec<RouteInfo> {
    table
        .routes()
        .iter()
        .map(|r| RouteInfo::from_route(r))
        .collect()
}
