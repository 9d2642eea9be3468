use base64ct::{Base64, Encoding};

use super::Transform;
use crate::ci::config::{Config, Step};
use crate::error::Result;

const SCRIPT_ENV: &str = "DRONE_SCRIPT";

/// Turns shell command steps into a single encoded script run by `/bin/sh`.
pub struct CommandTransform;

impl Transform for CommandTransform {
    fn name(&self) -> &'static str {
        "command"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            if step.is_plugin() {
                continue;
            }
            rewrite(step);
        }
        Ok(())
    }
}

fn rewrite(step: &mut Step) {
    step.environment.insert("HOME".to_string(), "/root".to_string());
    step.environment.insert("SHELL".to_string(), "/bin/sh".to_string());

    let script = generate_script(&step.commands);
    step.environment
        .insert(SCRIPT_ENV.to_string(), Base64::encode_string(script.as_bytes()));

    step.entrypoint = vec!["/bin/sh".to_string(), "-c".to_string()];
    step.command = vec![format!("echo ${} | base64 -d | /bin/sh -e", SCRIPT_ENV)];
}

const SETUP_SCRIPT: &str = r#"
if [ -n "$DRONE_NETRC_MACHINE" ]; then
cat <<EOF > $HOME/.netrc
machine $DRONE_NETRC_MACHINE
login $DRONE_NETRC_USERNAME
password $DRONE_NETRC_PASSWORD
EOF
chmod 0600 $HOME/.netrc
fi

unset DRONE_NETRC_USERNAME
unset DRONE_NETRC_PASSWORD
unset DRONE_SCRIPT
"#;

/// The shell script a command step runs, tracing each command before it runs.
pub fn generate_script(commands: &[String]) -> String {
    let mut script = String::from(SETUP_SCRIPT);
    for command in commands {
        let escaped = shell_quote(&format!("+ {}", command));
        script.push_str(&format!("\necho {}\n{}\n", escaped, command));
    }
    script
}

fn shell_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
