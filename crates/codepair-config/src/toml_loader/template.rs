//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# codepair relay configuration
# Only override what you want to change -- missing fields use defaults.

[server]
# bind = "0.0.0.0"
# port = 8080
# handshake_timeout_secs = 10   # 1-120

[pairing]
# code_length = 4               # 3-12, alphabet A-Z0-9
# ttl_secs = 600                # 1-max_ttl_secs
# max_ttl_secs = 3600           # 1-86400
# issue_attempts = 5            # 1-50
# max_members = 2               # 2 = two-party, up to 16 for group pairing
# closed_code_policy = "retain" # "retain" or "release"

[store]
# backend = "memory"            # "memory" or "rest"
# url = ""                      # required for "rest"
# token = ""                    # or CODEPAIR_STORE_TOKEN
# request_timeout_secs = 5      # 1-60
# retry_attempts = 3            # 0-10
# retry_backoff_ms = 100        # 1-10000
# key_prefix = "codepair:code:"

[sweep]
# interval_secs = 60            # 1-3600

[relay]
# outbound_buffer = 256         # 1-65536

[logging]
# filter = "codepair_relay=info,codepair_core=info"
"##
    .to_string()
}
