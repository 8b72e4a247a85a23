mod artifact;
mod dispatcher;
