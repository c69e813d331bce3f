use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "imageops-web",
    version,
    about = "Upload an image, pick an operation, download the result",
    long_about = "
Image Operations - web front end and command line tools

Runs a small web application where a user uploads an image, picks one of a
fixed set of image-processing operations and downloads the transformed
result. The same operations are available from the command line.

Example Usage:
  # Start the web server on the default port (5000)
  imageops-web

  # Start on another port with a different base directory
  imageops-web serve --port 8080 --base-dir /srv/imageops

  # Show every operation and its parameters
  imageops-web list

  # Apply one operation to one file
  imageops-web apply -i photo.jpg -o edges.png --op canny -p threshold1=50 -p threshold2=150

  # Apply one operation to a whole directory in parallel
  imageops-web batch -i ~/Photos -o ~/processed --op face_detect -p minNeighbors=3 -j 4"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the web server (default)
    Serve(ServeArgs),
    /// List supported operations and their parameters
    List,
    /// Apply one operation to a single image
    Apply(ApplyArgs),
    /// Apply one operation to every image under a directory
    Batch(BatchArgs),
}

#[derive(ClapArgs, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Base directory for storage folders and the face cascade (overrides BASE_DIR)
    #[arg(long = "base-dir", value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ApplyArgs {
    /// Input image
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Output image; the format follows the extension
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Operation name (see `list`)
    #[arg(long = "op", default_value = "grayscale")]
    pub operation: String,

    /// Operation parameter as key=value (can be specified multiple times)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Directory searched for haar_face.xml
    #[arg(long = "base-dir", env = "BASE_DIR", value_name = "DIR", default_value = ".")]
    pub base_dir: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// Input directory, scanned recursively
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Output directory; results mirror the input tree as <stem>.png
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Operation name (see `list`)
    #[arg(long = "op", default_value = "grayscale")]
    pub operation: String,

    /// Operation parameter as key=value (can be specified multiple times)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Number of parallel jobs (0 = auto-detect)
    #[arg(short = 'j', long = "jobs", default_value = "0")]
    pub jobs: usize,

    /// Directory searched for haar_face.xml
    #[arg(long = "base-dir", env = "BASE_DIR", value_name = "DIR", default_value = ".")]
    pub base_dir: PathBuf,
}

impl Args {
    /// The subcommand to run; no subcommand means `serve`
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve(ServeArgs::default()))
    }
}
