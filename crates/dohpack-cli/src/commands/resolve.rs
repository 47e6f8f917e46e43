//! `dohpack resolve`: inspect how a DohPath resolves.

use super::build::print_error;
use dohpack_core::dohpath::PathError;
use dohpack_core::pipeline::locate_root;
use dohpack_core::version::SCHEMA_VERSION;
use dohpack_core::{Config, DohPath, Error};
use miette::Result;
use serde::Serialize;

/// Output form of a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Form {
    Absolute,
    Relative,
    Slash,
    Caret,
    Url,
}

#[derive(Serialize)]
struct ResolveJson<'a> {
    schema_version: u32,
    ok: bool,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    form: Form,
    result: String,
}

fn convert(dp: &DohPath, path: &str, from: Option<&str>, form: Form) -> Result<String, PathError> {
    match form {
        Form::Absolute => dp.resolve(path, from),
        Form::Relative => dp.relative(path, from),
        Form::Slash => dp.dohslash(path, from),
        Form::Url => dp.file_url(path, from),
        Form::Caret => {
            let context = from.ok_or_else(|| PathError::MissingContext {
                path: path.to_string(),
            })?;
            dp.caret(path, context)
        }
    }
}

pub fn run(config: &Config, path: &str, from: Option<&str>, form: Form, json: bool) -> Result<()> {
    let outcome = locate_root(config).and_then(|root| {
        let dp = DohPath::new(&root);
        convert(&dp, path, from, form).map_err(Error::from)
    });

    match outcome {
        Ok(result) => {
            if json {
                let out = ResolveJson {
                    schema_version: SCHEMA_VERSION,
                    ok: true,
                    input: path,
                    from,
                    form,
                    result,
                };
                match serde_json::to_string_pretty(&out) {
                    Ok(s) => println!("{s}"),
                    Err(e) => eprintln!("error: cannot serialize result: {e}"),
                }
            } else {
                println!("{result}");
            }
            Ok(())
        }
        Err(e) => {
            print_error(&e, json);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_forms() {
        let dp = DohPath::new("/srv/app");
        let from = Some("/ui/ui.js");
        assert_eq!(
            convert(&dp, "^/x.css", from, Form::Absolute).unwrap(),
            "/srv/app/ui/x.css"
        );
        assert_eq!(convert(&dp, "^/x.css", from, Form::Relative).unwrap(), "ui/x.css");
        assert_eq!(convert(&dp, "^/x.css", from, Form::Slash).unwrap(), "/ui/x.css");
        assert_eq!(
            convert(&dp, "/srv/app/ui/x.css", from, Form::Caret).unwrap(),
            "^/x.css"
        );
        assert!(matches!(
            convert(&dp, "/ui/x.css", None, Form::Caret),
            Err(PathError::MissingContext { .. })
        ));
    }
}
