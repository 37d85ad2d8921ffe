//! Compile-time ARIA 1.2 vocabulary: the closed role enum plus the
//! attribute-applicability and inheritance tables the role algorithm and
//! the state engine consult.

use serde::Serialize;

macro_rules! aria_roles {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// The closed ARIA 1.2 role vocabulary.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "lowercase")]
        pub enum AriaRole {
            $($variant,)*
        }

        impl AriaRole {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(AriaRole::$variant => $name,)*
                }
            }

            /// Parse a single role token; unknown tokens yield `None`.
            pub fn from_str(token: &str) -> Option<AriaRole> {
                match token {
                    $($name => Some(AriaRole::$variant),)*
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for AriaRole {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

aria_roles! {
    Alert => "alert",
    AlertDialog => "alertdialog",
    Application => "application",
    Article => "article",
    Banner => "banner",
    Blockquote => "blockquote",
    Button => "button",
    Caption => "caption",
    Cell => "cell",
    Checkbox => "checkbox",
    Code => "code",
    ColumnHeader => "columnheader",
    Combobox => "combobox",
    Complementary => "complementary",
    ContentInfo => "contentinfo",
    Definition => "definition",
    Deletion => "deletion",
    Dialog => "dialog",
    Directory => "directory",
    Document => "document",
    Emphasis => "emphasis",
    Feed => "feed",
    Figure => "figure",
    Form => "form",
    Generic => "generic",
    Grid => "grid",
    GridCell => "gridcell",
    Group => "group",
    Heading => "heading",
    Img => "img",
    Insertion => "insertion",
    Link => "link",
    List => "list",
    ListBox => "listbox",
    ListItem => "listitem",
    Log => "log",
    Main => "main",
    Marquee => "marquee",
    Math => "math",
    Menu => "menu",
    MenuBar => "menubar",
    MenuItem => "menuitem",
    MenuItemCheckbox => "menuitemcheckbox",
    MenuItemRadio => "menuitemradio",
    Meter => "meter",
    Navigation => "navigation",
    None => "none",
    Note => "note",
    Option => "option",
    Paragraph => "paragraph",
    Presentation => "presentation",
    ProgressBar => "progressbar",
    Radio => "radio",
    RadioGroup => "radiogroup",
    Region => "region",
    Row => "row",
    RowGroup => "rowgroup",
    RowHeader => "rowheader",
    ScrollBar => "scrollbar",
    Search => "search",
    SearchBox => "searchbox",
    Separator => "separator",
    Slider => "slider",
    SpinButton => "spinbutton",
    Status => "status",
    Strong => "strong",
    Subscript => "subscript",
    Superscript => "superscript",
    Switch => "switch",
    Tab => "tab",
    Table => "table",
    TabList => "tablist",
    TabPanel => "tabpanel",
    Term => "term",
    TextBox => "textbox",
    Time => "time",
    Timer => "timer",
    Toolbar => "toolbar",
    Tooltip => "tooltip",
    Tree => "tree",
    TreeGrid => "treegrid",
    TreeItem => "treeitem",
}

impl AriaRole {
    /// `presentation` and `none` are synonyms that remove semantics.
    pub fn is_presentational(&self) -> bool {
        matches!(self, AriaRole::Presentation | AriaRole::None)
    }

    /// Roles whose accessible name may come from their text contents.
    pub fn allows_name_from_content(&self) -> bool {
        matches!(
            self,
            AriaRole::Button
                | AriaRole::Link
                | AriaRole::MenuItem
                | AriaRole::MenuItemCheckbox
                | AriaRole::MenuItemRadio
                | AriaRole::Option
                | AriaRole::Tab
        )
    }

    /// Roles agents can act on directly; the snapshot's `interactive_only`
    /// filter keeps these.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            AriaRole::Button
                | AriaRole::Checkbox
                | AriaRole::Combobox
                | AriaRole::Link
                | AriaRole::ListBox
                | AriaRole::MenuItem
                | AriaRole::MenuItemCheckbox
                | AriaRole::MenuItemRadio
                | AriaRole::Option
                | AriaRole::Radio
                | AriaRole::ScrollBar
                | AriaRole::SearchBox
                | AriaRole::Slider
                | AriaRole::SpinButton
                | AriaRole::Switch
                | AriaRole::Tab
                | AriaRole::TextBox
                | AriaRole::TreeItem
        )
    }

    /// Roles `aria-checked` applies to.
    pub fn supports_checked(&self) -> bool {
        matches!(
            self,
            AriaRole::Checkbox
                | AriaRole::MenuItemCheckbox
                | AriaRole::MenuItemRadio
                | AriaRole::Option
                | AriaRole::Radio
                | AriaRole::Switch
                | AriaRole::TreeItem
        )
    }

    /// Roles `aria-disabled` applies to.
    pub fn supports_disabled(&self) -> bool {
        matches!(
            self,
            AriaRole::Application
                | AriaRole::Button
                | AriaRole::Checkbox
                | AriaRole::ColumnHeader
                | AriaRole::Combobox
                | AriaRole::Grid
                | AriaRole::GridCell
                | AriaRole::Group
                | AriaRole::Link
                | AriaRole::ListBox
                | AriaRole::Menu
                | AriaRole::MenuBar
                | AriaRole::MenuItem
                | AriaRole::MenuItemCheckbox
                | AriaRole::MenuItemRadio
                | AriaRole::Option
                | AriaRole::Radio
                | AriaRole::RadioGroup
                | AriaRole::Row
                | AriaRole::RowHeader
                | AriaRole::ScrollBar
                | AriaRole::SearchBox
                | AriaRole::Separator
                | AriaRole::Slider
                | AriaRole::SpinButton
                | AriaRole::Switch
                | AriaRole::Tab
                | AriaRole::TabList
                | AriaRole::TextBox
                | AriaRole::Toolbar
                | AriaRole::Tree
                | AriaRole::TreeGrid
                | AriaRole::TreeItem
        )
    }

    /// Roles `aria-readonly` applies to.
    pub fn supports_readonly(&self) -> bool {
        matches!(
            self,
            AriaRole::Checkbox
                | AriaRole::ColumnHeader
                | AriaRole::Combobox
                | AriaRole::Grid
                | AriaRole::GridCell
                | AriaRole::ListBox
                | AriaRole::RadioGroup
                | AriaRole::RowHeader
                | AriaRole::SearchBox
                | AriaRole::Slider
                | AriaRole::SpinButton
                | AriaRole::Switch
                | AriaRole::TextBox
                | AriaRole::TreeGrid
        )
    }

    /// Roles `aria-expanded` applies to.
    pub fn supports_expanded(&self) -> bool {
        matches!(
            self,
            AriaRole::Application
                | AriaRole::Button
                | AriaRole::Checkbox
                | AriaRole::Combobox
                | AriaRole::GridCell
                | AriaRole::Link
                | AriaRole::ListBox
                | AriaRole::MenuItem
                | AriaRole::Row
                | AriaRole::RowHeader
                | AriaRole::Tab
                | AriaRole::TreeItem
        )
    }
}

/// Global ARIA states and properties. An element carrying any of these is
/// never stripped to `presentation`/`none` by conflict resolution.
pub const GLOBAL_ARIA_ATTRIBUTES: &[&str] = &[
    "aria-atomic",
    "aria-busy",
    "aria-controls",
    "aria-current",
    "aria-describedby",
    "aria-details",
    "aria-dropeffect",
    "aria-errormessage",
    "aria-flowto",
    "aria-grabbed",
    "aria-haspopup",
    "aria-hidden",
    "aria-invalid",
    "aria-keyshortcuts",
    "aria-label",
    "aria-labelledby",
    "aria-live",
    "aria-owns",
    "aria-relevant",
    "aria-roledescription",
];

/// Structural children that inherit `presentation`/`none` from the listed
/// parent tags when the parent's presentational role holds without
/// conflict.
pub const PRESENTATION_INHERITANCE: &[(&str, &[&str])] = &[
    ("dd", &["dl", "div"]),
    ("div", &["dl"]),
    ("dt", &["dl", "div"]),
    ("li", &["ol", "ul"]),
    ("tbody", &["table"]),
    ("td", &["tr"]),
    ("tfoot", &["table"]),
    ("th", &["tr"]),
    ("thead", &["table"]),
    ("tr", &["thead", "tbody", "tfoot", "table"]),
];

/// HTML void elements, rendered self-closing by `describe_element`.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Attributes that are boolean in HTML; their presence is the value.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "async", "autofocus", "checked", "defer", "disabled", "hidden", "inert", "multiple", "open",
    "readonly", "required", "selected",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub fn is_boolean_attribute(name: &str) -> bool {
    BOOLEAN_ATTRIBUTES.contains(&name)
}

pub fn is_global_aria_attribute(name: &str) -> bool {
    GLOBAL_ARIA_ATTRIBUTES.contains(&name)
}
