use crate::crds::PrometheusSource;

/// Fill in the fields users may leave out and normalize whitespace.
pub fn set_defaults(source: &mut PrometheusSource, namespace: &str) {
    let spec = &mut source.spec;
    trim(&mut spec.server_url);
    trim(&mut spec.prom_ql);
    trim(&mut spec.schedule);

    for field in [
        &mut spec.step,
        &mut spec.auth_token_file,
        &mut spec.ca_cert_config_map,
        &mut spec.service_account_name,
    ] {
        if let Some(value) = field {
            trim(value);
            if value.is_empty() {
                *field = None;
            }
        }
    }

    if let Some(reference) = spec.sink.r#ref.as_mut() {
        if reference.namespace.as_deref().unwrap_or_default().is_empty() {
            reference.namespace = Some(namespace.to_string());
        }
    }
}

fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}
