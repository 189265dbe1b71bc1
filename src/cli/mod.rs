//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tasktrail - local-first task tracking
#[derive(Parser, Debug)]
#[command(name = "tt", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.tasktrail/data/tasktrail.db)
    #[arg(long, global = true, env = "TT_DB")]
    pub db: Option<PathBuf>,

    /// Acting user id for permission checks and the audit trail
    /// (0 = anonymous)
    #[arg(long, global = true, env = "TT_ACTOR")]
    pub actor: Option<i64>,

    /// Reporter email for anonymous actors
    #[arg(long, global = true)]
    pub anon_email: Option<String>,

    /// Task access token for anonymous actors
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Output only the primary id
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the tasktrail database
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Project administration
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Category administration
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },

    /// User administration
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Grant a capability to a user (0 = everyone)
    Grant {
        /// User id to grant to
        user: i64,

        /// Capability name (e.g. view_tasks, close_task, is_admin)
        capability: String,

        /// Project scope (0 = all projects)
        #[arg(long, default_value = "0")]
        project: i64,
    },

    /// Revoke a previously granted capability
    Revoke {
        /// User id to revoke from
        user: i64,

        /// Capability name
        capability: String,

        /// Project scope (0 = all projects)
        #[arg(long, default_value = "0")]
        project: i64,
    },

    /// Task lifecycle operations
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Add a comment to a task
    Comment {
        /// Task id
        task: i64,

        /// Comment text
        text: String,

        /// Attach files with the comment
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },

    /// Attachment management
    Attach {
        #[command(subcommand)]
        command: AttachCommands,
    },

    /// Subscribe to task notifications
    Watch {
        /// Task ids
        tasks: Vec<i64>,

        /// Subscribe another user (needs manage-project)
        #[arg(short, long)]
        user: Option<i64>,

        /// Skip the permission check (internal flows)
        #[arg(long)]
        force: bool,
    },

    /// Unsubscribe from task notifications
    Unwatch {
        /// Task ids
        tasks: Vec<i64>,

        /// Unsubscribe another user (needs manage-project)
        #[arg(short, long)]
        user: Option<i64>,
    },

    /// List tasks with filters, sorting and paging
    List(ListArgs),

    /// Show a task's audit history (task 0 = global events)
    History {
        /// Task id
        task: i64,

        /// Maximum events to show
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Admin Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    Add {
        /// Project title
        #[arg(long)]
        title: String,

        /// Fallback owner for categories without one
        #[arg(long, default_value = "0")]
        default_owner: i64,

        /// Auto-assign resolved category owners to new tasks
        #[arg(long)]
        auto_assign: bool,
    },

    /// List projects
    List,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    /// Create a category
    Add {
        /// Project the category belongs to
        #[arg(long)]
        project: i64,

        /// Category name
        #[arg(long)]
        name: String,

        /// Parent category (omit for a root category)
        #[arg(long)]
        parent: Option<i64>,

        /// Category owner (0 = inherit)
        #[arg(long, default_value = "0")]
        owner: i64,
    },

    /// List a project's categories, tree order
    List {
        /// Project id
        project: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Login name (alphanumerics and underscores, max 32 chars)
        name: String,

        /// Password (omit to autogenerate one)
        #[arg(long)]
        pass: Option<String>,

        /// Display name
        #[arg(long)]
        real_name: Option<String>,

        /// Email address
        #[arg(long)]
        email: Option<String>,

        /// Jabber id
        #[arg(long)]
        jabber: Option<String>,

        /// Notification preference (0 none, 1 email, 2 jabber, 3 both)
        #[arg(long, default_value = "1")]
        notify: i64,
    },

    /// Delete a user (admin only)
    Del {
        /// User id
        id: i64,
    },

    /// List users
    List,
}

// ============================================================================
// Task Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Open a new task
    Open(TaskOpenArgs),

    /// Close a task
    Close {
        /// Task id
        id: i64,

        /// Resolution reason id (6 = duplicate)
        #[arg(long)]
        reason: i64,

        /// Closure comment; `TT#<n>` or `task <n>` in it links a
        /// duplicate
        #[arg(long, default_value = "")]
        comment: String,

        /// Leave the completion percentage as it is
        #[arg(long)]
        no_complete: bool,
    },

    /// Take sole ownership of tasks
    Take {
        /// Task ids
        ids: Vec<i64>,
    },

    /// Join the assignee set of tasks
    Assign {
        /// Task ids
        tasks: Vec<i64>,

        /// User to add (defaults to the actor)
        #[arg(long)]
        user: Option<i64>,

        /// Skip the permission check (internal flows)
        #[arg(long)]
        force: bool,
    },

    /// Vote for a task
    Vote {
        /// Task id
        id: i64,
    },

    /// Schedule a periodic reminder
    Remind {
        /// Task id
        id: i64,

        /// Reminder message
        #[arg(long)]
        message: String,

        /// Interval in seconds
        #[arg(long)]
        every: i64,

        /// Recipient (defaults to the actor)
        #[arg(long)]
        user: Option<i64>,

        /// First fire time (Unix ms; defaults to now)
        #[arg(long)]
        start: Option<i64>,
    },
}

#[derive(Args, Debug)]
pub struct TaskOpenArgs {
    /// Project to open the task in
    #[arg(long)]
    pub project: i64,

    /// One-line summary
    #[arg(long)]
    pub summary: String,

    /// Detailed description
    #[arg(long)]
    pub desc: String,

    /// Task type id
    #[arg(short = 't', long, default_value = "1")]
    pub task_type: i64,

    /// Severity (1-5)
    #[arg(long, default_value = "2")]
    pub severity: i64,

    /// Priority (1-5; needs modify-all-tasks to stick)
    #[arg(long)]
    pub priority: Option<i64>,

    /// Category id
    #[arg(long, default_value = "0")]
    pub category: i64,

    /// Version the problem was seen in
    #[arg(long, default_value = "0")]
    pub reported_in: i64,

    /// Version the fix is due in (needs modify-all-tasks)
    #[arg(long)]
    pub due_version: Option<i64>,

    /// Operating system id
    #[arg(long, default_value = "0")]
    pub os: i64,

    /// Due date as YYYY-MM-DD (needs modify-all-tasks)
    #[arg(long)]
    pub due: Option<String>,

    /// Initial status id (needs modify-all-tasks)
    #[arg(long)]
    pub status: Option<i64>,

    /// Initial assignees
    #[arg(long, value_delimiter = ',')]
    pub assign: Vec<i64>,

    /// Attach files to the new task
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// Subscribe yourself to the new task
    #[arg(long)]
    pub notify_self: bool,
}

// ============================================================================
// Attachment Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AttachCommands {
    /// Attach files to a task
    Add {
        /// Task id
        task: i64,

        /// Files to attach
        files: Vec<PathBuf>,

        /// Comment to attach them to (0 = the task itself)
        #[arg(long, default_value = "0")]
        comment: i64,
    },

    /// Delete attachments by id
    Rm {
        /// Attachment ids
        ids: Vec<i64>,
    },
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Restrict to one project
    #[arg(short, long)]
    pub project: Option<i64>,

    /// Filter by task type ids
    #[arg(short = 't', long = "type", value_delimiter = ',')]
    pub task_type: Vec<i64>,

    /// Filter by severities
    #[arg(long, value_delimiter = ',')]
    pub severity: Vec<i64>,

    /// Filter by status: open, closed, a status id or name
    #[arg(short, long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Filter by categories (includes their subtrees)
    #[arg(short, long, value_delimiter = ',')]
    pub category: Vec<i64>,

    /// Filter by due versions
    #[arg(long, value_delimiter = ',')]
    pub due_version: Vec<i64>,

    /// Filter by reported-in versions
    #[arg(long, value_delimiter = ',')]
    pub reported_in: Vec<i64>,

    /// Filter by completion percentages
    #[arg(long, value_delimiter = ',')]
    pub percent: Vec<i64>,

    /// Filter by assignees
    #[arg(short = 'a', long, value_delimiter = ',')]
    pub assignee: Vec<i64>,

    /// Also match tasks with no assignee
    #[arg(long)]
    pub unassigned: bool,

    /// Filter by opener (user id or name substring)
    #[arg(long)]
    pub opened_by: Option<String>,

    /// Filter by closer (user id or name substring)
    #[arg(long)]
    pub closed_by: Option<String>,

    /// Due on or after (YYYY-MM-DD)
    #[arg(long)]
    pub due_from: Option<String>,

    /// Due on or before (YYYY-MM-DD)
    #[arg(long)]
    pub due_to: Option<String>,

    /// Last edited on or after (YYYY-MM-DD)
    #[arg(long)]
    pub changed_from: Option<String>,

    /// Last edited on or before (YYYY-MM-DD)
    #[arg(long)]
    pub changed_to: Option<String>,

    /// Opened on or after (YYYY-MM-DD)
    #[arg(long)]
    pub opened_from: Option<String>,

    /// Opened on or before (YYYY-MM-DD)
    #[arg(long)]
    pub opened_to: Option<String>,

    /// Closed on or after (YYYY-MM-DD)
    #[arg(long)]
    pub closed_from: Option<String>,

    /// Closed on or before (YYYY-MM-DD)
    #[arg(long)]
    pub closed_to: Option<String>,

    /// Search words over summary, description and id
    #[arg(long, value_delimiter = ',')]
    pub search: Vec<String>,

    /// Match any search word instead of all
    #[arg(long)]
    pub match_any: bool,

    /// Search comment bodies too
    #[arg(long)]
    pub search_comments: bool,

    /// Only tasks on your watch list
    #[arg(short, long)]
    pub watched: bool,

    /// Only tasks with attachments
    #[arg(long)]
    pub has_attachment: bool,

    /// Columns to display (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Sort key: column or column:desc
    #[arg(long)]
    pub sort: Option<String>,

    /// Secondary sort key
    #[arg(long)]
    pub sort2: Option<String>,

    /// Skip this many visible tasks
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Page size (0 = everything)
    #[arg(short = 'n', long, default_value = "25")]
    pub page_size: usize,

    /// Print the full matching id list instead of a page
    #[arg(long)]
    pub ids_only: bool,
}
