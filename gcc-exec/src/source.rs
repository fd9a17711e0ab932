//! Pattern-based rewrites applied to a cell's code before compilation.
//!
//! None of this parses C. Entry-point detection and `scanf` rewriting are regex
//! heuristics: a `main` inside a comment or string literal counts as a definition,
//! and a `main` in a file without any `#include` line does not.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static INCLUDE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#include").expect("include pattern is valid"));

static MAIN_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(int|void)\s+main\s*\(([^)]*)\)\s*\{(?s:.*?)\}")
        .expect("main pattern is valid")
});

static SIMPLE_SCANF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"scanf\s*\(\s*"%(\w+)"\s*,\s*&([^;]+)\s*\)\s*;"#).expect("scanf pattern is valid")
});

/// Headers included by the synthesized translation unit, in emission order
pub const WRAPPER_HEADERS: [&str; 6] = [
    "assert.h",
    "stdbool.h",
    "stddef.h",
    "stdint.h",
    "stdio.h",
    "stdlib.h",
];

/// Whether `code` looks like it already defines an entry point.
///
/// Both an `#include` line and an `int main(...) {...}` or `void main(...) {...}`
/// shaped definition are required.
pub fn has_main_function(code: &str) -> bool {
    INCLUDE_LINE.is_match(code) && MAIN_DEFINITION.is_match(code)
}

/// Wrap a bare statement sequence into a complete translation unit
pub fn wrap_in_main(body: &str) -> String {
    let mut unit = String::with_capacity(body.len() + 160);
    for header in WRAPPER_HEADERS {
        unit.push_str("#include <");
        unit.push_str(header);
        unit.push_str(">\n");
    }
    unit.push_str("\nint main() {\n");
    unit.push_str(body);
    unit.push_str("\nreturn 0;\n}");
    unit
}

/// Follow every `scanf("%<spec>", &<expr>);` with a `printf` echoing what was read.
///
/// Calls with several specifiers or arguments don't match and are left alone.
pub fn echo_scanf_input(code: &str) -> String {
    SIMPLE_SCANF
        .replace_all(code, |caps: &Captures| {
            let spec = &caps[1];
            let expr = &caps[2];
            format!(r#"scanf("%{spec}", &{expr}); printf("%{spec}\n", {expr});"#)
        })
        .into_owned()
}

/// Full rewrite pipeline for metadata-aware cells: wrap if needed, then echo input.
/// Apply once; the output is not meant to be fed back in.
pub fn prepare_source(code: &str) -> String {
    let unit = if has_main_function(code) {
        code.to_string()
    } else {
        wrap_in_main(code)
    };
    echo_scanf_input(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_int_main_with_include() {
        let code = "#include <stdio.h>\nint main(){printf(\"hi\");return 0;}";
        assert!(has_main_function(code));
    }

    #[test]
    fn test_detects_void_main_with_args() {
        let code = "  #include <stdlib.h>\n\nvoid main (int argc, char **argv)\n{\n  exit(0);\n}\n";
        assert!(has_main_function(code));
    }

    #[test]
    fn test_main_without_include_is_not_detected() {
        assert!(!has_main_function("int main() { return 0; }"));
    }

    #[test]
    fn test_include_without_main_is_not_detected() {
        assert!(!has_main_function("#include <stdio.h>\nputs(\"x\");"));
        assert!(!has_main_function("#include <stdio.h>\nint mainly(void) { return 1; }"));
    }

    #[test]
    fn test_main_without_closing_brace_is_not_detected() {
        assert!(!has_main_function("#include <stdio.h>\nint main() {\n"));
    }

    #[test]
    fn test_main_in_comment_is_detected() {
        // Known false positive of the heuristic
        let code = "#include <stdio.h>\n/*\nint main() { }\n*/\nputs(\"x\");";
        assert!(has_main_function(code));
    }

    #[test]
    fn test_wrap_layout() {
        let wrapped = wrap_in_main("int x = 1;");
        assert_eq!(
            wrapped,
            "#include <assert.h>\n#include <stdbool.h>\n#include <stddef.h>\n\
             #include <stdint.h>\n#include <stdio.h>\n#include <stdlib.h>\n\n\
             int main() {\nint x = 1;\nreturn 0;\n}"
        );
        assert!(has_main_function(&wrapped));
    }

    #[test]
    fn test_scanf_gets_echo() {
        let code = "int x;\nscanf(\"%d\", &x);\n";
        assert_eq!(
            echo_scanf_input(code),
            "int x;\nscanf(\"%d\", &x); printf(\"%d\\n\", x);\n"
        );
    }

    #[test]
    fn test_scanf_whitespace_and_expressions() {
        let code = "scanf ( \"%lf\" ,  &values[i] ) ;";
        assert_eq!(
            echo_scanf_input(code),
            "scanf(\"%lf\", &values[i] ); printf(\"%lf\\n\", values[i] );"
        );
    }

    #[test]
    fn test_every_scanf_is_rewritten() {
        let code = "scanf(\"%d\", &a);\nscanf(\"%s\", &name);";
        let rewritten = echo_scanf_input(code);
        assert!(rewritten.contains("printf(\"%d\\n\", a);"));
        assert!(rewritten.contains("printf(\"%s\\n\", name);"));
    }

    #[test]
    fn test_unsupported_scanf_shapes_pass_through() {
        let code = "scanf(\"%d %d\", &a, &b);\nscanf(\"%s\", name);\nscanf(\"%d\", &c)";
        assert_eq!(echo_scanf_input(code), code);
    }

    #[test]
    fn test_prepare_keeps_full_programs() {
        let code = "#include <stdio.h>\nint main(){int n; scanf(\"%d\", &n); return n;}";
        let prepared = prepare_source(code);
        assert!(prepared.starts_with("#include <stdio.h>\nint main(){"));
        assert!(prepared.contains("printf(\"%d\\n\", n);"));
        assert!(!prepared.contains("#include <assert.h>"));
    }
}
