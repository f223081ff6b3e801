use crate::{
    carto::coords::realization,
    config::Config,
    error::RavenError,
    wps::{
        io::{InputSpec, Kind},
        process::{Outputs, Process},
    },
};
use chrono::Utc;
use std::path::Path;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const NAMESPACES: &str = r#"xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink""#;

/// escape text and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn href(path: &Path) -> String {
    let path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", path.display())
}

fn element(name: &str, text: &str) -> String {
    format!("<{0}>{1}</{0}>", name, escape(text))
}

/* # execute */

pub fn execute_response(process: &Process, outputs: &Outputs) -> String {
    let mut out = String::new();
    out.push_str(DECLARATION);
    out.push('\n');
    out.push_str(&format!(
        "<wps:ExecuteResponse {} service=\"WPS\" version=\"1.0.0\">\n",
        NAMESPACES
    ));
    out.push_str(&format!(
        "  <wps:Process wps:processVersion=\"1.0\">{}{}</wps:Process>\n",
        element("ows:Identifier", process.identifier),
        element("ows:Title", process.title)
    ));
    out.push_str(&format!(
        "  <wps:Status creationTime=\"{}\"><wps:ProcessSucceeded>{} run(s) completed</wps:ProcessSucceeded></wps:Status>\n",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        outputs.runs.len()
    ));
    out.push_str("  <wps:ProcessOutputs>\n");
    // several parameter sets are told apart by their ensemble member
    let axis = (outputs.runs.len() > 1).then(|| realization(outputs.runs.len()));
    for (index, run) in outputs.runs.iter().enumerate() {
        let member = axis
            .as_ref()
            .map(|axis| element("ows:Abstract", &format!("{} {}", axis.name, axis.values[index])))
            .unwrap_or_default();
        for spec in process.outputs() {
            let body = if spec.literal {
                match run.literals.get(spec.identifier) {
                    Some(value) => format!(
                        "<wps:Data><wps:LiteralData>{}</wps:LiteralData></wps:Data>",
                        escape(value)
                    ),
                    None => continue,
                }
            } else {
                match run.files.get(spec.identifier) {
                    Some(path) => format!(
                        "<wps:Reference xlink:href=\"{}\" mimeType=\"{}\"/>",
                        escape(&href(path)),
                        spec.mime
                    ),
                    None => continue,
                }
            };
            out.push_str(&format!(
                "    <wps:Output>{}{}{}{}</wps:Output>\n",
                element("ows:Identifier", spec.identifier),
                element("ows:Title", spec.title),
                member,
                body
            ));
        }
    }
    out.push_str("  </wps:ProcessOutputs>\n");
    out.push_str("</wps:ExecuteResponse>\n");
    out
}

/* # faults */

fn locator(error: &RavenError) -> Option<&str> {
    match error {
        RavenError::Validation { name, .. } | RavenError::Missing(name) => Some(name.as_str()),
        _ => None,
    }
}

pub fn exception_report(error: &RavenError) -> String {
    let locator = locator(error)
        .map(|name| format!(" locator=\"{}\"", escape(name)))
        .unwrap_or_default();
    format!(
        "{}\n<ows:ExceptionReport xmlns:ows=\"http://www.opengis.net/ows/1.1\" version=\"1.0.0\">\n  \
         <ows:Exception exceptionCode=\"{}\"{}>{}</ows:Exception>\n</ows:ExceptionReport>\n",
        DECLARATION,
        error.exception_code(),
        locator,
        element("ows:ExceptionText", &error.to_string())
    )
}

/* # descriptions */

fn describe_input(spec: &InputSpec) -> String {
    let data = match spec.kind {
        Kind::File => "<ComplexData><Default><Format><MimeType>application/x-netcdf</MimeType>\
                       </Format></Default></ComplexData>"
            .to_string(),
        kind => {
            let allowed = if spec.allowed.is_empty() {
                "<ows:AnyValue/>".to_string()
            } else {
                format!(
                    "<ows:AllowedValues>{}</ows:AllowedValues>",
                    spec.allowed
                        .iter()
                        .map(|value| element("ows:Value", value))
                        .collect::<String>()
                )
            };
            let default = spec
                .default
                .map(|value| element("DefaultValue", value))
                .unwrap_or_default();
            format!(
                "<LiteralData><ows:DataType>{}</ows:DataType>{}{}</LiteralData>",
                kind.name(),
                allowed,
                default
            )
        }
    };
    format!(
        "      <Input minOccurs=\"{}\" maxOccurs=\"{}\">{}{}{}{}</Input>\n",
        spec.min_occurs,
        spec.max_occurs,
        element("ows:Identifier", spec.identifier),
        element("ows:Title", spec.title),
        element("ows:Abstract", spec.abstract_),
        data
    )
}

pub fn describe_process(processes: &[Process], config: &Config) -> String {
    let mut out = String::new();
    out.push_str(DECLARATION);
    out.push('\n');
    out.push_str(&format!(
        "<wps:ProcessDescriptions {} service=\"WPS\" version=\"1.0.0\" xml:lang=\"en-US\">\n",
        NAMESPACES
    ));
    for process in processes {
        out.push_str(
            "  <ProcessDescription wps:processVersion=\"1.0\" storeSupported=\"true\" statusSupported=\"false\">\n",
        );
        out.push_str(&format!(
            "    {}{}{}\n",
            element("ows:Identifier", process.identifier),
            element("ows:Title", process.title),
            element("ows:Abstract", process.abstract_)
        ));
        out.push_str("    <DataInputs>\n");
        for spec in process.inputs(config) {
            out.push_str(&describe_input(&spec));
        }
        out.push_str("    </DataInputs>\n");
        out.push_str("    <ProcessOutputs>\n");
        for spec in process.outputs() {
            let data = if spec.literal {
                "<LiteralOutput><ows:DataType>string</ows:DataType></LiteralOutput>".to_string()
            } else {
                format!(
                    "<ComplexOutput><Default><Format><MimeType>{}</MimeType></Format></Default></ComplexOutput>",
                    spec.mime
                )
            };
            out.push_str(&format!(
                "      <Output>{}{}{}</Output>\n",
                element("ows:Identifier", spec.identifier),
                element("ows:Title", spec.title),
                data
            ));
        }
        out.push_str("    </ProcessOutputs>\n");
        out.push_str("  </ProcessDescription>\n");
    }
    out.push_str("</wps:ProcessDescriptions>\n");
    out
}
